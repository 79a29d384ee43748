//! Request and response models shared by the pipeline and the HTTP layer

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A catalog resource resolved to a download location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub id: String,
    pub url: String,
    /// Format as declared by the catalog, lowercased
    pub declared_format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Type tag assigned to every column at load time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Numeric,
    Text,
}

/// Column name and detected kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub kind: ColumnKind,
}

/// Sort direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(format!("sort_order must be 'asc' or 'desc', got '{other}'")),
        }
    }
}

/// A one-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: usize,
    pub page_size: usize,
}

impl PageRequest {
    /// Zero-based row window `[(page-1)*page_size, page*page_size)`
    pub fn window(&self) -> Range<usize> {
        let start = self.page.saturating_sub(1).saturating_mul(self.page_size);
        start..start.saturating_add(self.page_size)
    }
}

/// Number of pages needed for `total` rows; zero rows means zero pages
pub fn total_pages(total: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(page_size)
}

/// Supported chart aggregations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Histogram,
    Bar,
    Line,
    Pie,
}

impl FromStr for ChartType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "histogram" => Ok(ChartType::Histogram),
            "bar" => Ok(ChartType::Bar),
            "line" => Ok(ChartType::Line),
            "pie" => Ok(ChartType::Pie),
            other => Err(format!(
                "chart_type must be one of histogram, bar, line, pie; got '{other}'"
            )),
        }
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChartType::Histogram => "histogram",
            ChartType::Bar => "bar",
            ChartType::Line => "line",
            ChartType::Pie => "pie",
        };
        f.write_str(name)
    }
}

/// Summary statistics for one numeric column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStat {
    pub column: String,
    /// Non-null values
    pub count: usize,
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub sum: f64,
    /// Sample standard deviation; `None` with fewer than two values
    pub std: Option<f64>,
}

/// One chart data point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartBucket {
    pub label: String,
    pub value: f64,
}

/// Response payloads returned by the resource operations
pub mod responses {
    use serde::{Deserialize, Serialize};
    use serde_json::{Map, Value};

    use super::{ChartBucket, ChartType, ColumnInfo, ColumnStat};
    use crate::catalog::Dataset;

    /// A row rendered as a JSON object keyed by column name
    pub type JsonRow = Map<String, Value>;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct PreviewResponse {
        pub columns: Vec<String>,
        pub rows: Vec<JsonRow>,
        pub total_rows: usize,
        pub has_more: bool,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ColumnsResponse {
        pub columns: Vec<ColumnInfo>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct FilterResponse {
        pub columns: Vec<String>,
        pub rows: Vec<JsonRow>,
        pub page: usize,
        pub page_size: usize,
        pub total_pages: usize,
        pub total: usize,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct KpisResponse {
        pub kpis: Vec<ColumnStat>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ChartResponse {
        pub column: String,
        pub chart_type: ChartType,
        pub data: Vec<ChartBucket>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct DatasetsResponse {
        pub datasets: Vec<Dataset>,
    }
}
