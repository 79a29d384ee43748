//! URL validation and HTTP access to remote resources
//!
//! Every outbound request goes through [`send_with_retry`], which retries
//! transport failures and 5xx responses with exponential backoff.

use std::io::{self, Read};
use std::time::Duration;

use futures_util::TryStreamExt;
use reqwest::header::CONTENT_LENGTH;
use reqwest::{redirect, Client, RequestBuilder, Response, StatusCode};
use thiserror::Error;
use tokio_util::io::{StreamReader, SyncIoBridge};
use tracing::{debug, warn};
use url::Url;

use crate::config::Settings;
use crate::{DataError, DataResult};

/// File extensions the pipeline knows how to parse
pub const ALLOWED_EXTENSIONS: [&str; 3] = [".csv", ".xls", ".xlsx"];

/// Base delay between retries; doubled after each attempt
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(500);

/// Redirects followed before giving up
const MAX_REDIRECTS: usize = 10;

/// Allow-list for resource URLs
#[derive(Debug, Clone)]
pub struct UrlPolicy {
    allowed_domains: Vec<String>,
}

impl UrlPolicy {
    pub fn new(allowed_domains: Vec<String>) -> Self {
        Self {
            allowed_domains: allowed_domains
                .into_iter()
                .map(|d| d.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.allowed_domains.clone())
    }

    /// Scheme and host checks only
    pub fn host_allowed(&self, url: &Url) -> bool {
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        let Some(host) = url.host_str().filter(|h| !h.is_empty()) else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        self.allowed_domains
            .iter()
            .any(|domain| host == *domain || host.ends_with(&format!(".{domain}")))
    }

    /// Full check: scheme, host allow-list and file extension
    pub fn is_allowed(&self, raw: &str) -> bool {
        let Ok(url) = Url::parse(raw) else {
            return false;
        };
        let path = url.path().to_ascii_lowercase();
        self.host_allowed(&url) && ALLOWED_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
    }

    /// Parse and check a URL, failing with `InvalidReference`
    pub fn validate(&self, raw: &str) -> DataResult<Url> {
        if !self.is_allowed(raw) {
            return Err(DataError::InvalidReference(format!("URL not allowed: {raw}")));
        }
        Url::parse(raw).map_err(|e| DataError::InvalidReference(e.to_string()))
    }
}

/// Send a request, retrying transport errors and 5xx responses
///
/// `build` is called once per attempt. The last response or error is
/// returned once `max_retries` retries are used up.
pub async fn send_with_retry<F>(
    build: F,
    max_retries: u32,
    backoff: Duration,
) -> Result<Response, reqwest::Error>
where
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 0u32;
    loop {
        let result = build().send().await;
        let retryable = match &result {
            Ok(response) => response.status().is_server_error(),
            Err(_) => true,
        };

        if !retryable || attempt >= max_retries {
            return result;
        }

        match &result {
            Ok(response) => {
                warn!(status = %response.status(), attempt, "retrying after server error")
            }
            Err(error) => warn!(%error, attempt, "retrying after transport error"),
        }

        tokio::time::sleep(backoff.saturating_mul(1 << attempt.min(16))).await;
        attempt += 1;
    }
}

/// HTTP client for probing and downloading resources
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_retries: u32,
    backoff: Duration,
}

impl HttpFetcher {
    /// Build a client whose redirects must stay on allowed hosts
    pub fn new(timeout: Duration, max_retries: u32, policy: UrlPolicy) -> DataResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(redirect::Policy::custom(move |attempt| {
                if attempt.previous().len() >= MAX_REDIRECTS {
                    attempt.stop()
                } else if policy.host_allowed(attempt.url()) {
                    attempt.follow()
                } else {
                    attempt.stop()
                }
            }))
            .build()
            .map_err(|e| DataError::UpstreamUnavailable(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_retries,
            backoff: DEFAULT_BACKOFF,
        })
    }

    pub fn from_settings(settings: &Settings) -> DataResult<Self> {
        Self::new(
            settings.request_timeout(),
            settings.max_retries,
            UrlPolicy::from_settings(settings),
        )
    }

    /// Override the retry backoff
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Declared size of the resource from a HEAD request
    ///
    /// Returns 0 when the server does not say.
    pub async fn probe_size(&self, url: &Url) -> DataResult<u64> {
        let response = send_with_retry(
            || self.client.head(url.clone()),
            self.max_retries,
            self.backoff,
        )
        .await?;
        let response = ensure_success(response, "size probe")?;

        let size = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(0);
        debug!(%url, size, "probed resource size");
        Ok(size)
    }

    /// Start the download, failing early when the declared length is past
    /// `limit_bytes`
    ///
    /// The body is left unread; see [`into_blocking_reader`].
    pub async fn open(&self, url: &Url, limit_bytes: u64) -> DataResult<Response> {
        let response = send_with_retry(
            || self.client.get(url.clone()),
            self.max_retries,
            self.backoff,
        )
        .await?;
        let response = ensure_success(response, "download")?;
        if let Some(length) = response.content_length() {
            if length > limit_bytes {
                return Err(DataError::PayloadTooLarge {
                    size: length,
                    limit: limit_bytes,
                });
            }
        }
        Ok(response)
    }
}

fn ensure_success(response: Response, context: &str) -> DataResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    // Redirects to allowed hosts are followed, so one left here points elsewhere
    if status.is_redirection() {
        return Err(DataError::InvalidReference(format!(
            "{context} redirected outside the allowed hosts (HTTP {})",
            status.as_u16()
        )));
    }
    if status == StatusCode::NOT_FOUND {
        return Err(DataError::UpstreamUnavailable(format!(
            "{context} failed: resource URL returned 404"
        )));
    }
    Err(DataError::UpstreamUnavailable(format!(
        "{context} failed with HTTP {}",
        status.as_u16()
    )))
}

/// Raised inside the body reader once more than the limit has arrived
#[derive(Debug, Error)]
#[error("body exceeds {limit} bytes")]
struct BodyLimitExceeded {
    size: u64,
    limit: u64,
}

/// Blocking [`Read`] over a response body, for parsers on the blocking pool
///
/// Bytes are pulled from the network only as the parser asks for them, so
/// dropping the reader early leaves the rest of the body unread. Reading
/// past `limit_bytes` fails; [`read_error`] maps that to `PayloadTooLarge`.
///
/// Must be called from within the tokio runtime.
pub fn into_blocking_reader(response: Response, limit_bytes: u64) -> impl Read + Send + 'static {
    let stream = Box::pin(response.bytes_stream().map_err(io::Error::other));
    LimitedReader {
        inner: SyncIoBridge::new(StreamReader::new(stream)),
        read: 0,
        limit: limit_bytes,
    }
}

/// Map an error from a body reader to the pipeline's taxonomy
pub fn read_error(error: io::Error) -> DataError {
    if let Some(exceeded) = error
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<BodyLimitExceeded>())
    {
        return DataError::PayloadTooLarge {
            size: exceeded.size,
            limit: exceeded.limit,
        };
    }
    DataError::UpstreamUnavailable(format!("reading resource body failed: {error}"))
}

struct LimitedReader<R> {
    inner: R,
    read: u64,
    limit: u64,
}

impl<R: Read> Read for LimitedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.read += n as u64;
        if self.read > self.limit {
            return Err(io::Error::other(BodyLimitExceeded {
                size: self.read,
                limit: self.limit,
            }));
        }
        Ok(n)
    }
}
