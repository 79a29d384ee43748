//! Resource id resolution through the catalog, with a bounded cache

use std::sync::Arc;

use monita_core::{Catalog, ResourceRef};
use tracing::{debug, warn};

use crate::cache::LruCache;
use crate::{DataError, DataResult};

/// Resolves resource ids to download locations
///
/// Only successful lookups are cached; a missing resource or a catalog
/// failure is asked again next time.
#[derive(Clone)]
pub struct ResourceLocator {
    catalog: Arc<dyn Catalog>,
    cache: LruCache<String, ResourceRef>,
}

impl ResourceLocator {
    pub fn new(catalog: Arc<dyn Catalog>, cache_capacity: usize) -> Self {
        Self {
            catalog,
            cache: LruCache::new(cache_capacity),
        }
    }

    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.catalog
    }

    pub async fn resolve(&self, resource_id: &str) -> DataResult<ResourceRef> {
        let key = resource_id.to_string();
        if let Some(cached) = self.cache.get(&key) {
            debug!(resource_id, "resource metadata cache hit");
            return Ok(cached);
        }

        let resource = match self.catalog.resource_show(resource_id).await {
            Ok(Some(resource)) => resource,
            Ok(None) => return Err(DataError::NotFound(format!("resource '{resource_id}'"))),
            Err(error) => {
                warn!(
                    resource_id,
                    catalog = self.catalog.catalog_name(),
                    %error,
                    "catalog lookup failed"
                );
                return Err(error.into());
            }
        };

        let reference = ResourceRef {
            id: resource.id,
            url: resource.url,
            declared_format: resource.format.trim().to_ascii_lowercase(),
            name: resource.name,
        };
        debug!(
            resource_id,
            url = %reference.url,
            format = %reference.declared_format,
            "resolved resource"
        );
        self.cache.put(key, reference.clone());
        Ok(reference)
    }

    /// Entries currently cached
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}
