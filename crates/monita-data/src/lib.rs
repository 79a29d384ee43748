//! Tabular resource pipeline for the Monita API
//!
//! Resolves catalog resources, guards and fetches them over HTTP, parses
//! CSV/Excel bodies into Arrow-backed tables and runs query and aggregation
//! operations over them.

pub mod aggregate;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod fetch;
pub mod loader;
pub mod locator;
pub mod query;
pub mod schema;
pub mod service;
pub mod sources;
pub mod table;

#[cfg(test)]
pub(crate) mod test_utils;

use arrow::error::ArrowError;
use monita_core::CatalogError;
use thiserror::Error;
use tokio::task::JoinError;

// Re-exports
pub use cache::LruCache;
pub use catalog::CkanCatalog;
pub use config::{NullConfig, Settings};
pub use fetch::{HttpFetcher, UrlPolicy};
pub use loader::{LoadedTable, TabularFormat, TabularLoader};
pub use locator::ResourceLocator;
pub use query::{FilterQuery, FilterSpec};
pub use service::ResourceService;
pub use table::Table;

/// Errors that can occur in data operations
///
/// Each variant corresponds to one failure class the HTTP layer maps to a
/// status code.
#[derive(Error, Debug)]
pub enum DataError {
    /// Disallowed or malformed resource URL, or unsupported extension
    #[error("invalid resource reference: {0}")]
    InvalidReference(String),

    /// Unknown resource id or unknown column
    #[error("{0} not found")]
    NotFound(String),

    #[error("resource is too large: {size} bytes (max {limit} bytes)")]
    PayloadTooLarge { size: u64, limit: u64 },

    /// Network or catalog failure after retries, including timeouts
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The body could not be parsed as a table
    #[error("bad resource: {0}")]
    BadResource(String),

    /// The body parsed but holds no header row
    #[error("bad resource: resource has no header row")]
    EmptyResource,

    /// Malformed filter, pagination or chart parameters
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Result type alias for data operations
pub type DataResult<T> = Result<T, DataError>;

impl From<ArrowError> for DataError {
    fn from(error: ArrowError) -> Self {
        DataError::BadResource(error.to_string())
    }
}

impl From<CatalogError> for DataError {
    fn from(error: CatalogError) -> Self {
        DataError::UpstreamUnavailable(error.to_string())
    }
}

impl From<JoinError> for DataError {
    fn from(error: JoinError) -> Self {
        DataError::BadResource(format!("parser task failed: {error}"))
    }
}

impl From<reqwest::Error> for DataError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            DataError::UpstreamUnavailable(format!("request timed out: {error}"))
        } else {
            DataError::UpstreamUnavailable(error.to_string())
        }
    }
}
