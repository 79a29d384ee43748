//! Runtime settings for the resource pipeline
//!
//! Settings start from built-in defaults, are optionally replaced by a JSON
//! file and finally overridden field by field from `MONITA_*` environment
//! variables.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::null_handling::NullConfig;

/// Environment variable naming an optional JSON settings file
pub const CONFIG_PATH_ENV: &str = "MONITA_CONFIG";

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Errors while loading settings
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// CKAN action API base, e.g. `https://datos.cali.gov.co/api/3/action`
    pub ckan_base_url: String,

    /// Host suffixes resources may be downloaded from
    pub allowed_domains: Vec<String>,

    /// Hard limit on resource size
    pub max_file_size_mb: u64,

    /// Per-request network timeout
    pub request_timeout_secs: u64,

    /// Retries on 5xx responses
    pub max_retries: u32,

    /// Above this probed size the loader reads in row chunks
    pub large_file_threshold_mb: u64,

    /// Rows per chunk for large files
    pub read_chunk_rows: usize,

    pub default_page_size: usize,
    pub max_page_size: usize,

    /// Capacity of the resource metadata cache
    pub cache_capacity: usize,

    /// Address the HTTP server binds to
    pub bind_addr: String,

    /// Cell values treated as null while parsing
    pub null_config: NullConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ckan_base_url: "https://datos.cali.gov.co/api/3/action".to_string(),
            allowed_domains: vec!["datos.cali.gov.co".to_string()],
            max_file_size_mb: 100,
            request_timeout_secs: 30,
            max_retries: 3,
            large_file_threshold_mb: 10,
            read_chunk_rows: 1000,
            default_page_size: 20,
            max_page_size: 100,
            cache_capacity: 128,
            bind_addr: "0.0.0.0:8000".to_string(),
            null_config: NullConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings from the file named by `MONITA_CONFIG` (if any) and the
    /// process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        settings.apply_overrides(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a JSON file; missing fields keep their defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override fields from `MONITA_*` variables provided by `lookup`
    ///
    /// `MONITA_ALLOWED_DOMAINS` is a comma-separated list.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("MONITA_CKAN_BASE_URL") {
            self.ckan_base_url = value;
        }
        if let Some(value) = lookup("MONITA_ALLOWED_DOMAINS") {
            self.allowed_domains = value
                .split(',')
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .collect();
        }
        if let Some(value) = lookup("MONITA_BIND_ADDR") {
            self.bind_addr = value;
        }
        parse_override(&lookup, "MONITA_MAX_FILE_SIZE_MB", &mut self.max_file_size_mb)?;
        parse_override(&lookup, "MONITA_REQUEST_TIMEOUT_SECS", &mut self.request_timeout_secs)?;
        parse_override(&lookup, "MONITA_MAX_RETRIES", &mut self.max_retries)?;
        parse_override(
            &lookup,
            "MONITA_LARGE_FILE_THRESHOLD_MB",
            &mut self.large_file_threshold_mb,
        )?;
        parse_override(&lookup, "MONITA_READ_CHUNK_ROWS", &mut self.read_chunk_rows)?;
        parse_override(&lookup, "MONITA_DEFAULT_PAGE_SIZE", &mut self.default_page_size)?;
        parse_override(&lookup, "MONITA_MAX_PAGE_SIZE", &mut self.max_page_size)?;
        parse_override(&lookup, "MONITA_CACHE_CAPACITY", &mut self.cache_capacity)?;
        Ok(())
    }

    /// Reject combinations the pipeline cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_page_size == 0 {
            return Err(invalid("max_page_size", self.max_page_size));
        }
        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            return Err(invalid("default_page_size", self.default_page_size));
        }
        if self.read_chunk_rows == 0 {
            return Err(invalid("read_chunk_rows", self.read_chunk_rows));
        }
        if self.request_timeout_secs == 0 {
            return Err(invalid("request_timeout_secs", self.request_timeout_secs));
        }
        Ok(())
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(BYTES_PER_MB)
    }

    pub fn large_file_threshold_bytes(&self) -> u64 {
        self.large_file_threshold_mb.saturating_mul(BYTES_PER_MB)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_override<F, T>(lookup: &F, key: &str, target: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(value) = lookup(key) {
        *target = value.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        })?;
    }
    Ok(())
}

fn invalid(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}
