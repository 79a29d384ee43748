//! Filtering, sorting and pagination over tables
//!
//! Unknown filter keys and sort columns are ignored rather than rejected.

use std::cmp::Ordering;

use arrow::array::{Array, BooleanArray};
use monita_core::{total_pages, PageRequest, SortOrder};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::schema::parse_number;
use crate::table::{Column, Table};
use crate::{DataError, DataResult};

/// Column → target value filters, applied in order as a conjunction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    entries: Vec<(String, Value)>,
}

impl FilterSpec {
    pub fn new(entries: Vec<(String, Value)>) -> Self {
        Self { entries }
    }

    /// Parse a JSON object such as `{"comuna": "1"}`
    pub fn parse(raw: &str) -> DataResult<Self> {
        let object: Map<String, Value> = serde_json::from_str(raw)
            .map_err(|e| DataError::InvalidRequest(format!("filters must be a JSON object: {e}")))?;
        Ok(Self {
            entries: object.into_iter().collect(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply every filter whose column exists in `table`
    pub fn apply(&self, table: &Table) -> DataResult<Table> {
        let mut current = table.clone();
        for (column, value) in &self.entries {
            let Some(col) = current.column_by_name(column) else {
                continue;
            };
            let mask = filter_mask(col, value);
            current = current.filter(&mask)?;
        }
        Ok(current)
    }
}

/// String form of a filter value; JSON strings are used verbatim
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn filter_mask(column: Column<'_>, value: &Value) -> BooleanArray {
    let text = value_text(value);

    if let (Column::Numeric(array), Some(target)) = (column, parse_number(&text)) {
        return array
            .iter()
            .map(|cell| Some(cell == Some(target)))
            .collect();
    }

    let needle = text.to_lowercase();
    (0..column.len())
        .map(|row| {
            let matched = column
                .display(row)
                .is_some_and(|cell| cell.to_lowercase().contains(&needle));
            Some(matched)
        })
        .collect()
}

/// Stable sort by `column`; a missing column leaves the table unchanged
///
/// Nulls sort last in both directions.
pub fn sort_table(table: &Table, column: &str, order: SortOrder) -> DataResult<Table> {
    let Some(col) = table.column_by_name(column) else {
        return Ok(table.clone());
    };

    let mut indices: Vec<u32> = (0..table.num_rows() as u32).collect();
    match col {
        Column::Numeric(array) => indices.sort_by(|&a, &b| {
            let left = array.is_valid(a as usize).then(|| array.value(a as usize));
            let right = array.is_valid(b as usize).then(|| array.value(b as usize));
            compare_nulls_last(left, right, order, |x, y| x.total_cmp(y))
        }),
        Column::Text(array) => indices.sort_by(|&a, &b| {
            let left = array.is_valid(a as usize).then(|| array.value(a as usize));
            let right = array.is_valid(b as usize).then(|| array.value(b as usize));
            compare_nulls_last(left, right, order, |x, y| x.cmp(y))
        }),
    }

    table.take(&indices)
}

fn compare_nulls_last<T>(
    left: Option<T>,
    right: Option<T>,
    order: SortOrder,
    cmp: impl Fn(&T, &T) -> Ordering,
) -> Ordering {
    match (left, right) {
        (Some(l), Some(r)) => match order {
            SortOrder::Asc => cmp(&l, &r),
            SortOrder::Desc => cmp(&r, &l),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// One page of a query result
#[derive(Debug, Clone)]
pub struct Page {
    pub rows: Table,
    pub page: usize,
    pub page_size: usize,
    /// Rows after filtering, before pagination
    pub total: usize,
    pub total_pages: usize,
}

/// Cut the page window out of `table`
pub fn paginate(table: &Table, request: PageRequest) -> Page {
    let total = table.num_rows();
    Page {
        rows: table.slice(request.window()),
        page: request.page,
        page_size: request.page_size,
        total,
        total_pages: total_pages(total, request.page_size),
    }
}

/// Raw filter query parameters as received over HTTP
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterQuery {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
    /// JSON object of column filters
    pub filters: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

/// A validated filter query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub filters: FilterSpec,
    pub sort: Option<(String, SortOrder)>,
    pub page: PageRequest,
}

impl FilterQuery {
    /// Validate parameters against the configured page size bounds
    pub fn plan(&self, default_page_size: usize, max_page_size: usize) -> DataResult<QueryPlan> {
        let page = self.page.unwrap_or(1);
        if page < 1 {
            return Err(DataError::InvalidRequest("page must be at least 1".to_string()));
        }

        let page_size = self.page_size.unwrap_or(default_page_size);
        if page_size < 1 || page_size > max_page_size {
            return Err(DataError::InvalidRequest(format!(
                "page_size must be between 1 and {max_page_size}"
            )));
        }

        let filters = match self.filters.as_deref() {
            Some(raw) if !raw.trim().is_empty() => FilterSpec::parse(raw)?,
            _ => FilterSpec::default(),
        };

        let order = match self.sort_order.as_deref() {
            Some(raw) => raw.parse::<SortOrder>().map_err(DataError::InvalidRequest)?,
            None => SortOrder::Asc,
        };
        let sort = self
            .sort_by
            .as_ref()
            .filter(|column| !column.is_empty())
            .map(|column| (column.clone(), order));

        Ok(QueryPlan {
            filters,
            sort,
            page: PageRequest { page, page_size },
        })
    }
}

impl QueryPlan {
    /// Filter, then sort, then paginate
    pub fn execute(&self, table: &Table) -> DataResult<Page> {
        let filtered = self.filters.apply(table)?;
        let sorted = match &self.sort {
            Some((column, order)) => sort_table(&filtered, column, *order)?,
            None => filtered,
        };
        Ok(paginate(&sorted, self.page))
    }
}
