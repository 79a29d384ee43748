//! Resource operations
//!
//! [`ResourceService`] owns everything a request needs: settings, the
//! cached locator, the URL policy and the HTTP client. Each operation runs
//! the same pipeline (resolve, validate, probe, open, parse) and drops the
//! parsed table before returning its payload. The body is parsed while it
//! downloads, so a preview only pulls the rows it shows.

use std::sync::Arc;

use monita_core::responses::{
    ChartResponse, ColumnsResponse, DatasetsResponse, FilterResponse, KpisResponse,
    PreviewResponse,
};
use monita_core::{Catalog, ChartType, ResourceRef, SearchQuery};
use reqwest::Response;
use tracing::{info, warn};
use url::Url;

use crate::aggregate::{self, MAX_BINS, MIN_BINS};
use crate::catalog::CkanCatalog;
use crate::config::Settings;
use crate::fetch::{into_blocking_reader, HttpFetcher, UrlPolicy};
use crate::loader::{LoadedTable, TabularFormat, TabularLoader};
use crate::locator::ResourceLocator;
use crate::query::FilterQuery;
use crate::{DataError, DataResult};

/// Largest preview the API hands out
pub const MAX_PREVIEW_ROWS: usize = 100;

/// A download in progress, body not yet read
struct OpenedResource {
    reference: ResourceRef,
    format: TabularFormat,
    response: Response,
    probed_size: u64,
}

/// Entry point for every resource operation
#[derive(Clone)]
pub struct ResourceService {
    settings: Arc<Settings>,
    locator: ResourceLocator,
    policy: UrlPolicy,
    fetcher: HttpFetcher,
    loader: TabularLoader,
}

impl ResourceService {
    pub fn new(settings: Settings, catalog: Arc<dyn Catalog>) -> DataResult<Self> {
        let fetcher = HttpFetcher::from_settings(&settings)?;
        Ok(Self {
            locator: ResourceLocator::new(catalog, settings.cache_capacity),
            policy: UrlPolicy::from_settings(&settings),
            loader: TabularLoader::from_settings(&settings),
            fetcher,
            settings: Arc::new(settings),
        })
    }

    /// Service talking to the CKAN instance named in `settings`
    pub fn from_settings(settings: Settings) -> DataResult<Self> {
        let catalog = CkanCatalog::from_settings(&settings)?;
        Self::new(settings, Arc::new(catalog))
    }

    /// Resolved metadata for `resource_id`
    pub async fn resource(&self, resource_id: &str) -> DataResult<ResourceRef> {
        self.locator.resolve(resource_id).await
    }

    /// Dataset search, passed through to the catalog
    pub async fn search(&self, query: &SearchQuery) -> DataResult<DatasetsResponse> {
        let datasets = self.locator.catalog().package_search(query).await?;
        info!(query = %query.full_text(), results = datasets.len(), "dataset search");
        Ok(DatasetsResponse { datasets })
    }

    /// First `rows` rows, with a flag telling whether more exist
    pub async fn preview(&self, resource_id: &str, rows: usize) -> DataResult<PreviewResponse> {
        if !(1..=MAX_PREVIEW_ROWS).contains(&rows) {
            return Err(DataError::InvalidRequest(format!(
                "rows must be between 1 and {MAX_PREVIEW_ROWS}"
            )));
        }

        let opened = self.open(resource_id).await?;
        let loaded = self.parse(opened, Some(rows)).await?;
        Ok(PreviewResponse {
            columns: loaded.table.column_names(),
            rows: loaded.table.to_json_rows(),
            total_rows: loaded.table.num_rows(),
            has_more: loaded.has_more,
        })
    }

    /// Column names and kinds; a resource without a header has no columns
    pub async fn columns(&self, resource_id: &str) -> DataResult<ColumnsResponse> {
        let opened = self.open(resource_id).await?;
        let columns = match self.parse(opened, Some(1)).await {
            Ok(loaded) => loaded.table.columns(),
            Err(DataError::EmptyResource) => Vec::new(),
            Err(e) => return Err(e),
        };
        Ok(ColumnsResponse { columns })
    }

    /// Filter, sort and paginate the whole resource
    pub async fn filter(
        &self,
        resource_id: &str,
        query: &FilterQuery,
    ) -> DataResult<FilterResponse> {
        let plan = query.plan(self.settings.default_page_size, self.settings.max_page_size)?;

        let opened = self.open(resource_id).await?;
        let loaded = self.parse(opened, None).await?;
        let page = plan.execute(&loaded.table)?;
        Ok(FilterResponse {
            columns: page.rows.column_names(),
            rows: page.rows.to_json_rows(),
            page: page.page,
            page_size: page.page_size,
            total_pages: page.total_pages,
            total: page.total,
        })
    }

    /// Statistics for every numeric column
    pub async fn kpis(&self, resource_id: &str) -> DataResult<KpisResponse> {
        let opened = self.open(resource_id).await?;
        let loaded = self.parse(opened, None).await?;
        Ok(KpisResponse {
            kpis: aggregate::column_stats(&loaded.table),
        })
    }

    /// Chart buckets for one column
    pub async fn chart(
        &self,
        resource_id: &str,
        column: &str,
        chart_type: &str,
        bins: usize,
    ) -> DataResult<ChartResponse> {
        let chart_type: ChartType = chart_type.parse().map_err(DataError::InvalidRequest)?;
        if !(MIN_BINS..=MAX_BINS).contains(&bins) {
            return Err(DataError::InvalidRequest(format!(
                "bins must be between {MIN_BINS} and {MAX_BINS}"
            )));
        }

        let opened = self.open(resource_id).await?;
        let loaded = self.parse(opened, None).await?;
        let data = aggregate::chart_data(&loaded.table, column, chart_type, bins)?;
        Ok(ChartResponse {
            column: column.to_string(),
            chart_type,
            data,
        })
    }

    /// Resolve, validate and probe a resource, then start its download
    async fn open(&self, resource_id: &str) -> DataResult<OpenedResource> {
        let reference = self.locator.resolve(resource_id).await?;
        let url: Url = self.policy.validate(&reference.url)?;
        let format = TabularFormat::resolve(&reference.declared_format, url.path())?;

        let limit = self.settings.max_file_size_bytes();
        let probed_size = self.fetcher.probe_size(&url).await?;
        if probed_size > limit {
            warn!(resource_id, size = probed_size, limit, "resource exceeds size limit");
            return Err(DataError::PayloadTooLarge {
                size: probed_size,
                limit,
            });
        }

        let response = self.fetcher.open(&url, limit).await?;
        Ok(OpenedResource {
            reference,
            format,
            response,
            probed_size,
        })
    }

    async fn parse(
        &self,
        opened: OpenedResource,
        max_rows: Option<usize>,
    ) -> DataResult<LoadedTable> {
        let OpenedResource {
            reference,
            format,
            response,
            probed_size,
        } = opened;

        let source = into_blocking_reader(response, self.settings.max_file_size_bytes());
        let loaded = self
            .loader
            .load_async(source, format, max_rows, probed_size)
            .await?;
        if loaded.skipped_rows > 0 {
            warn!(
                resource_id = %reference.id,
                skipped = loaded.skipped_rows,
                "skipped malformed rows"
            );
        }
        info!(
            resource_id = %reference.id,
            ?format,
            probed_size,
            strategy = ?loaded.strategy,
            rows = loaded.table.num_rows(),
            columns = loaded.table.num_columns(),
            "loaded resource"
        );
        Ok(loaded)
    }
}
