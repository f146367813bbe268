//! Catalog read surface.
//!
//! Items are cached for five minutes. The catalog is slow-moving relative
//! to the cart, so cart mutations never touch this cache; consumers that
//! need a guaranteed-fresh list call [`Catalog::invalidate`] first.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::Deserialize;
use tracing::{debug, instrument};

use shopfront_core::Item;

use crate::error::ApiError;
use crate::http::ApiClient;

const CACHE_TTL: Duration = Duration::from_secs(300);
const CACHE_KEY: &str = "items";

#[derive(Debug, Deserialize)]
struct ItemsEnvelope {
    #[serde(default)]
    items: Vec<Item>,
}

/// Client for the product catalog.
#[derive(Clone)]
pub struct Catalog {
    api: ApiClient,
    cache: Cache<&'static str, Arc<Vec<Item>>>,
}

impl Catalog {
    /// Create a catalog client over the pipeline.
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        let cache = Cache::builder()
            .max_capacity(8)
            .time_to_live(CACHE_TTL)
            .build();
        Self { api, cache }
    }

    /// List catalog items, served from cache when fresh.
    ///
    /// # Errors
    ///
    /// Returns the classified [`ApiError`] when the fetch fails; a stale
    /// cache entry is not served in place of an error.
    #[instrument(skip(self))]
    pub async fn list_items(&self) -> Result<Arc<Vec<Item>>, ApiError> {
        if let Some(items) = self.cache.get(CACHE_KEY).await {
            debug!("catalog cache hit");
            return Ok(items);
        }

        let envelope: ItemsEnvelope = self.api.get("/items").await?;
        let items = Arc::new(envelope.items);
        self.cache.insert(CACHE_KEY, Arc::clone(&items)).await;
        Ok(items)
    }

    /// Drop cached catalog data so the next list hits the backend.
    pub async fn invalidate(&self) {
        self.cache.invalidate(CACHE_KEY).await;
    }
}
