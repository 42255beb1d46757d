use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::debug;

use super::{CacheBackend, CacheResult};

/// Redis-backed cache using `SET .. EX`
#[derive(Clone)]
pub struct RedisCacheBackend {
    redis: ConnectionManager,
}

impl RedisCacheBackend {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    pub async fn connect(redis_url: &str) -> CacheResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self::new(manager))
    }

    /// PING for health checks
    pub async fn ping(&self) -> CacheResult<()> {
        redis::cmd("PING")
            .query_async::<_, String>(&mut self.redis.clone())
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CacheBackend for RedisCacheBackend {
    async fn get_raw(&self, key: &str) -> CacheResult<Option<String>> {
        let value: Option<String> = self.redis.clone().get(key).await?;
        Ok(value)
    }

    async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()> {
        // Redis EX has second granularity; never round a live entry down to 0.
        let seconds = ttl.as_secs().max(1);
        self.redis
            .clone()
            .set_ex::<_, _, ()>(key, value, seconds)
            .await?;
        debug!(key = %key, ttl = seconds, "Cache set");
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.redis.clone().del::<_, ()>(key).await?;
        Ok(())
    }
}
