mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{coalescer_config, record, store_with};
use listing_service::cache::{CacheBackend, CacheError, CacheResult, JsonCache, MemoryCacheBackend};
use listing_service::config::CacheConfig;
use listing_service::db::MemoryRecordStore;
use listing_service::error::AppError;
use listing_service::models::{Collection, CounterKind};
use listing_service::services::{DetailService, InteractionCoalescer};

fn detail_service(
    store: Arc<MemoryRecordStore>,
    backend: Arc<dyn CacheBackend>,
) -> (DetailService, InteractionCoalescer) {
    let coalescer = InteractionCoalescer::new(store.clone(), coalescer_config(3));
    let service = DetailService::new(
        Collection::SkillPost,
        store,
        JsonCache::new(backend),
        coalescer.clone(),
        &CacheConfig::default(),
        Duration::from_secs(1),
    );
    (service, coalescer)
}

#[tokio::test(start_paused = true)]
async fn test_hit_skips_store_and_view_count() {
    let store = store_with(vec![record("sp-1").views(10).build()]);
    let (service, coalescer) = detail_service(store.clone(), Arc::new(MemoryCacheBackend::new()));

    let first = service.get_detail("sp-1").await.unwrap();
    assert_eq!(first.view_count, 11);
    assert_eq!(store.lookup_count(), 1);
    assert_eq!(coalescer.pending_delta("sp-1", CounterKind::View), 1);

    let second = service.get_detail("sp-1").await.unwrap();
    assert_eq!(second, first);
    assert_eq!(store.lookup_count(), 1);
    assert_eq!(coalescer.pending_delta("sp-1", CounterKind::View), 1);
}

#[tokio::test(start_paused = true)]
async fn test_entry_expires_after_ttl() {
    let store = store_with(vec![record("sp-1").views(10).build()]);
    let (service, coalescer) = detail_service(store.clone(), Arc::new(MemoryCacheBackend::new()));

    service.get_detail("sp-1").await.unwrap();
    coalescer.flush_now().await;
    assert_eq!(store.get("sp-1").unwrap().view_count, 11);

    tokio::time::advance(Duration::from_secs(299)).await;
    service.get_detail("sp-1").await.unwrap();
    assert_eq!(store.lookup_count(), 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    let refreshed = service.get_detail("sp-1").await.unwrap();
    assert_eq!(store.lookup_count(), 2);
    assert_eq!(refreshed.view_count, 12);
}

#[tokio::test(start_paused = true)]
async fn test_missing_entity_is_not_found_without_view() {
    let store = store_with(vec![record("sp-1").build()]);
    let (service, coalescer) = detail_service(store, Arc::new(MemoryCacheBackend::new()));

    let err = service.get_detail("nope").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(coalescer.pending_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_invalidate_forces_store_read() {
    let store = store_with(vec![record("sp-1").build()]);
    let (service, _coalescer) = detail_service(store.clone(), Arc::new(MemoryCacheBackend::new()));

    service.get_detail("sp-1").await.unwrap();
    service.invalidate("sp-1").await.unwrap();
    service.get_detail("sp-1").await.unwrap();

    assert_eq!(store.lookup_count(), 2);
}

/// Cache that is always down
struct UnreachableCache;

fn unreachable() -> CacheError {
    CacheError::Redis(redis::RedisError::from((
        redis::ErrorKind::IoError,
        "connection refused",
    )))
}

#[async_trait]
impl CacheBackend for UnreachableCache {
    async fn get_raw(&self, _key: &str) -> CacheResult<Option<String>> {
        Err(unreachable())
    }

    async fn set_raw(&self, _key: &str, _value: String, _ttl: Duration) -> CacheResult<()> {
        Err(unreachable())
    }

    async fn delete(&self, _key: &str) -> CacheResult<()> {
        Err(unreachable())
    }
}

#[tokio::test(start_paused = true)]
async fn test_cache_outage_falls_back_to_store() {
    let store = store_with(vec![record("sp-1").views(3).build()]);
    let (service, coalescer) = detail_service(store.clone(), Arc::new(UnreachableCache));

    let first = service.get_detail("sp-1").await.unwrap();
    let second = service.get_detail("sp-1").await.unwrap();

    assert_eq!(first.view_count, 4);
    assert_eq!(second.view_count, 4);
    assert_eq!(store.lookup_count(), 2);
    assert_eq!(coalescer.pending_delta("sp-1", CounterKind::View), 2);
}
