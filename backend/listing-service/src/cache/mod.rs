//! Key/value cache backends for the read-through detail cache.
//!
//! Values are stored as JSON strings with a TTL. `RedisCacheBackend` is used
//! when `REDIS_URL` is configured; otherwise `MemoryCacheBackend` keeps
//! entries in process. Each service instance owns its own memory cache, so
//! freshness across a fleet is only eventual.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

mod memory;
mod redis_backend;

pub use memory::MemoryCacheBackend;
pub use redis_backend::RedisCacheBackend;

use crate::models::Collection;

/// Bump when the cached detail shape changes
pub const CACHE_VERSION: &str = "v1";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;

#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get_raw(&self, key: &str) -> CacheResult<Option<String>>;

    async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()>;

    async fn delete(&self, key: &str) -> CacheResult<()>;
}

/// `listing:v1:skill_post:detail:{id}`
pub fn detail_key(collection: Collection, id: &str) -> String {
    format!(
        "listing:{}:{}:detail:{}",
        CACHE_VERSION,
        collection.as_str(),
        id
    )
}

/// Typed JSON view over a backend
#[derive(Clone)]
pub struct JsonCache {
    backend: Arc<dyn CacheBackend>,
}

impl JsonCache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        let Some(data) = self.backend.get_raw(key).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<T>(&data) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(key = %key, error = %e, "Cache deserialization failed, evicting entry");
                // A corrupted entry is a miss; the caller repopulates it.
                if let Err(del_err) = self.backend.delete(key).await {
                    debug!(key = %key, error = %del_err, "evicting corrupted entry failed");
                }
                Ok(None)
            }
        }
    }

    pub async fn set<T: Serialize + Sync>(&self, key: &str, value: &T, ttl: Duration) -> CacheResult<()> {
        let data = serde_json::to_string(value)?;
        self.backend.set_raw(key, data, ttl).await
    }

    pub async fn delete(&self, key: &str) -> CacheResult<()> {
        self.backend.delete(key).await
    }
}
