//! Shared fixtures for listing-service integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use listing_service::config::{
    AppConfig, CacheConfig, CoalescerConfig, Config, DatabaseConfig, ListingConfig,
};
use listing_service::db::MemoryRecordStore;
use listing_service::models::{GeoPoint, ListingRecord};
use listing_service::resilience::RetryPolicy;

/// Fixed reference instant so ordering assertions are deterministic
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

/// Builder for listing rows with sensible defaults
pub struct RecordBuilder {
    record: ListingRecord,
}

impl RecordBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            record: ListingRecord {
                id: id.to_string(),
                kind: "offer".to_string(),
                category: Some("photography".to_string()),
                role: None,
                city: Some("Shanghai".to_string()),
                title: format!("listing {}", id),
                description: None,
                content: None,
                tags: Vec::new(),
                author_id: "author-1".to_string(),
                lat: None,
                lng: None,
                view_count: 0,
                like_count: 0,
                collect_count: 0,
                rating: 0.0,
                created_at: base_time(),
                updated_at: base_time(),
            },
        }
    }

    pub fn kind(mut self, kind: &str) -> Self {
        self.record.kind = kind.to_string();
        self
    }

    pub fn city(mut self, city: &str) -> Self {
        self.record.city = Some(city.to_string());
        self
    }

    pub fn title(mut self, title: &str) -> Self {
        self.record.title = title.to_string();
        self
    }

    pub fn tags(mut self, tags: &[&str]) -> Self {
        self.record.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Creation time `minutes` after the reference instant
    pub fn created_minutes(mut self, minutes: i64) -> Self {
        self.record.created_at = base_time() + chrono::Duration::minutes(minutes);
        self.record.updated_at = self.record.created_at;
        self
    }

    pub fn likes(mut self, likes: i64) -> Self {
        self.record.like_count = likes;
        self
    }

    pub fn rating(mut self, rating: f64) -> Self {
        self.record.rating = rating;
        self
    }

    pub fn views(mut self, views: i64) -> Self {
        self.record.view_count = views;
        self
    }

    pub fn at(mut self, point: GeoPoint) -> Self {
        self.record.lat = Some(point.lat);
        self.record.lng = Some(point.lng);
        self
    }

    pub fn build(self) -> ListingRecord {
        self.record
    }
}

pub fn record(id: &str) -> RecordBuilder {
    RecordBuilder::new(id)
}

pub fn store_with(records: Vec<ListingRecord>) -> Arc<MemoryRecordStore> {
    Arc::new(MemoryRecordStore::with_records(records))
}

/// A point `km` kilometres due north of `origin`
pub fn north_of(origin: GeoPoint, km: f64) -> GeoPoint {
    let degrees = km / listing_service::listing::geo::EARTH_RADIUS_KM * 180.0 / std::f64::consts::PI;
    GeoPoint::new(origin.lat + degrees, origin.lng)
}

pub fn listing_config() -> ListingConfig {
    ListingConfig {
        store_timeout: Duration::from_secs(1),
        ..ListingConfig::default()
    }
}

/// 500ms window, no in-cycle retries
pub fn coalescer_config(max_requeues: u32) -> CoalescerConfig {
    CoalescerConfig {
        flush_interval: Duration::from_millis(500),
        retry: RetryPolicy::none(),
        max_requeues,
        write_timeout: Duration::from_secs(1),
    }
}

/// Full service configuration for in-process HTTP tests; nothing connects to `database.url`.
pub fn test_config() -> Config {
    Config {
        app: AppConfig {
            env: "test".to_string(),
            host: "127.0.0.1".to_string(),
            http_port: 0,
        },
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            min_connections: 0,
        },
        redis: None,
        listing: listing_config(),
        coalescer: coalescer_config(3),
        cache: CacheConfig::default(),
    }
}
