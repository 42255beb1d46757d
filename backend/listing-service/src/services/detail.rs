/// Detail service - read-through cache over single-entity lookups
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::interactions::InteractionCoalescer;
use crate::cache::{detail_key, JsonCache};
use crate::config::CacheConfig;
use crate::db::RecordStore;
use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::{Collection, ListingDetail};
use crate::resilience::with_timeout;

pub struct DetailService {
    collection: Collection,
    store: Arc<dyn RecordStore>,
    cache: JsonCache,
    interactions: InteractionCoalescer,
    ttl: Duration,
    store_timeout: Duration,
}

impl DetailService {
    pub fn new(
        collection: Collection,
        store: Arc<dyn RecordStore>,
        cache: JsonCache,
        interactions: InteractionCoalescer,
        config: &CacheConfig,
        store_timeout: Duration,
    ) -> Self {
        Self {
            collection,
            store,
            cache,
            interactions,
            ttl: config.detail_ttl,
            store_timeout,
        }
    }

    /// Cached detail read.
    ///
    /// A hit returns without touching the store and without counting a view.
    /// A miss reads the store, records one view through the coalescer, and
    /// caches the public shape for the configured TTL. Writes elsewhere do
    /// not invalidate the entry; it is served until it expires.
    pub async fn get_detail(&self, id: &str) -> Result<ListingDetail> {
        let key = detail_key(self.collection, id);
        let label = self.collection.as_str();

        match self.cache.get::<ListingDetail>(&key).await {
            Ok(Some(detail)) => {
                metrics::record_cache_event(label, "hit");
                debug!(key = %key, "Detail cache hit");
                return Ok(detail);
            }
            Ok(None) => metrics::record_cache_event(label, "miss"),
            Err(e) => {
                // Cache trouble degrades to a store read.
                metrics::record_cache_event(label, "error");
                warn!(key = %key, error = %e, "Detail cache read failed");
            }
        }

        let record = with_timeout(self.store_timeout, self.store.find_by_id(id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} {}", label, id)))?;

        self.interactions.record_view(id);

        let mut detail = ListingDetail::from(record);
        detail.view_count += 1;

        if let Err(e) = self.cache.set(&key, &detail, self.ttl).await {
            metrics::record_cache_event(label, "write_error");
            debug!(key = %key, error = %e, "Detail cache set failed");
        }

        Ok(detail)
    }

    /// Drop the cached entry so the next read goes to the store.
    pub async fn invalidate(&self, id: &str) -> Result<()> {
        let key = detail_key(self.collection, id);
        self.cache.delete(&key).await?;
        metrics::record_cache_event(self.collection.as_str(), "invalidate");
        Ok(())
    }
}
