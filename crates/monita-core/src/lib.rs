//! Core abstractions for the Monita tabular resource API
//!
//! This crate provides the catalog abstraction and the request/response
//! models shared between the data pipeline and the HTTP layer.

pub mod catalog;
pub mod model;

// Re-export commonly used types
pub use catalog::{Catalog, CatalogError, CatalogResource, Dataset, DatasetResource, SearchQuery};
pub use model::{
    ChartBucket, ChartType, ColumnInfo, ColumnKind, ColumnStat, PageRequest, ResourceRef,
    SortOrder, total_pages,
};
pub use model::responses;
