//! CKAN action API client

use std::time::Duration;

use monita_core::{Catalog, CatalogError, CatalogResource, Dataset, SearchQuery};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::config::Settings;
use crate::fetch::{send_with_retry, DEFAULT_BACKOFF};

/// Envelope around every CKAN action response
#[derive(Debug, Deserialize)]
struct ActionResponse<T> {
    success: bool,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    results: Vec<Dataset>,
}

/// [`Catalog`] backed by a CKAN instance
#[derive(Debug, Clone)]
pub struct CkanCatalog {
    base_url: String,
    client: Client,
    max_retries: u32,
    backoff: Duration,
}

impl CkanCatalog {
    /// `base_url` is the action API root, e.g. `https://host/api/3/action`
    pub fn new(base_url: &str, timeout: Duration, max_retries: u32) -> Result<Self, CatalogError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CatalogError::Transport(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            max_retries,
            backoff: DEFAULT_BACKOFF,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, CatalogError> {
        Self::new(&settings.ckan_base_url, settings.request_timeout(), settings.max_retries)
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Call an action; `Ok(None)` on 404 or an unsuccessful envelope
    async fn action<T: DeserializeOwned>(
        &self,
        action: &str,
        params: &[(&str, String)],
    ) -> Result<Option<T>, CatalogError> {
        let url = format!("{}/{action}", self.base_url);
        let response = send_with_retry(
            || self.client.get(&url).query(params),
            self.max_retries,
            self.backoff,
        )
        .await
        .map_err(|e| CatalogError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(action, "catalog returned 404");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(CatalogError::Status {
                status: status.as_u16(),
            });
        }

        let envelope: ActionResponse<T> = response
            .json()
            .await
            .map_err(|e| CatalogError::Decode(e.to_string()))?;
        if !envelope.success {
            return Ok(None);
        }
        Ok(envelope.result)
    }
}

#[async_trait::async_trait]
impl Catalog for CkanCatalog {
    async fn resource_show(&self, id: &str) -> Result<Option<CatalogResource>, CatalogError> {
        self.action("resource_show", &[("id", id.to_string())]).await
    }

    async fn package_search(&self, query: &SearchQuery) -> Result<Vec<Dataset>, CatalogError> {
        let mut params = vec![
            ("q", query.full_text()),
            ("start", query.start.to_string()),
            ("rows", query.rows.to_string()),
        ];
        if let Some(format) = &query.format {
            params.push(("fq", format!("res_format:\"{}\"", format.to_ascii_uppercase())));
        }

        let result: Option<SearchResult> = self.action("package_search", &params).await?;
        let mut datasets = result.map(|r| r.results).unwrap_or_default();
        if let Some(format) = &query.format {
            datasets.retain(|d| d.has_resource_format(format));
        }
        Ok(datasets)
    }

    fn catalog_name(&self) -> &str {
        &self.base_url
    }
}
