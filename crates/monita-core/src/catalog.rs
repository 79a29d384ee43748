//! Catalog abstraction
//!
//! The catalog is the metadata service that knows where a resource lives and
//! what format it declares. The pipeline only ever talks to it through the
//! [`Catalog`] trait so tests can substitute an in-memory catalog.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by a catalog implementation
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Transport(String),

    #[error("catalog returned HTTP {status}")]
    Status { status: u16 },

    #[error("catalog response could not be decoded: {0}")]
    Decode(String),
}

/// A single resource as described by the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogResource {
    pub id: String,
    #[serde(default)]
    pub url: String,
    /// Declared format, e.g. `CSV` or `XLSX`; free text, may be empty
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Resource entry embedded in a dataset search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetResource {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub format: String,
}

/// A dataset (CKAN "package") returned by a search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub resources: Vec<DatasetResource>,
}

impl Dataset {
    /// Whether any of the dataset's resources declares `format` (case-insensitive)
    pub fn has_resource_format(&self, format: &str) -> bool {
        self.resources
            .iter()
            .any(|r| r.format.eq_ignore_ascii_case(format))
    }
}

/// Parameters for a dataset search
#[derive(Debug, Clone, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub start: usize,
    #[serde(default = "default_search_rows")]
    pub rows: usize,
    /// Keep only datasets with a resource of this format
    pub format: Option<String>,
    /// Extra search term appended to `query`
    pub theme: Option<String>,
}

fn default_search_rows() -> usize {
    10
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            query: String::new(),
            start: 0,
            rows: default_search_rows(),
            format: None,
            theme: None,
        }
    }
}

impl SearchQuery {
    /// The full-text query sent to the catalog, with the theme appended
    pub fn full_text(&self) -> String {
        let mut q = self.query.clone();
        if let Some(theme) = &self.theme {
            q.push(' ');
            q.push_str(theme);
        }
        q.trim().to_string()
    }
}

/// Trait for metadata catalogs
#[async_trait::async_trait]
pub trait Catalog: Send + Sync {
    /// Look up a resource by id; `Ok(None)` when the catalog does not know it
    async fn resource_show(&self, id: &str) -> Result<Option<CatalogResource>, CatalogError>;

    /// Search datasets
    async fn package_search(&self, query: &SearchQuery) -> Result<Vec<Dataset>, CatalogError>;

    /// Name used in logs
    fn catalog_name(&self) -> &str;
}
