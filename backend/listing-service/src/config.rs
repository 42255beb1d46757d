/// Configuration management for Listing Service
///
/// Loads configuration from environment variables (a `.env` file is honoured
/// by `main` through dotenvy before this runs).
use crate::resilience::RetryPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Redis configuration; detail cache stays in-process when absent
    pub redis: Option<RedisConfig>,
    /// Listing query settings
    pub listing: ListingConfig,
    /// Interaction write-coalescer settings
    pub coalescer: CoalescerConfig,
    /// Detail cache settings
    pub cache: CacheConfig,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (dev, staging, prod)
    pub env: String,
    /// Server host to bind to
    pub host: String,
    /// HTTP port
    pub http_port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL
    pub url: String,
    /// Max connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Min connections in pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis URL (redis://host:port)
    pub url: String,
}

/// Listing query settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingConfig {
    /// Page size used when the caller sends none
    pub default_limit: u32,
    /// Upper clamp for the page size
    pub max_limit: u32,
    /// Maximum candidates pulled from the store for in-memory geo ranking
    pub geo_candidate_limit: u32,
    /// Bound on every store call made on the listing and detail paths
    pub store_timeout: Duration,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
            geo_candidate_limit: 1000,
            store_timeout: Duration::from_secs(5),
        }
    }
}

/// Interaction write-coalescer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoalescerConfig {
    /// Debounce window between the first buffered delta and the flush
    pub flush_interval: Duration,
    /// Retry policy for each batched increment inside one flush
    pub retry: RetryPolicy,
    /// Flush cycles a failed delta may be re-queued before it is dropped
    pub max_requeues: u32,
    /// Bound on a single increment attempt
    pub write_timeout: Duration,
}

impl Default for CoalescerConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_millis(500),
            retry: RetryPolicy::default(),
            max_requeues: 5,
            write_timeout: Duration::from_secs(2),
        }
    }
}

/// Detail cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL of a cached detail entry
    pub detail_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            detail_ttl: Duration::from_secs(300), // 5 minutes
        }
    }
}

// Default values
fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_millis(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let app = AppConfig {
            env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: env_or("PORT", 8010),
        };

        let database = DatabaseConfig {
            url: std::env::var("DATABASE_URL")
                .context("DATABASE_URL environment variable not set")?,
            max_connections: env_or("DB_MAX_CONNECTIONS", default_max_connections()),
            min_connections: env_or("DB_MIN_CONNECTIONS", default_min_connections()),
        };

        let redis = std::env::var("REDIS_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .map(|url| RedisConfig { url });

        let listing_defaults = ListingConfig::default();
        let listing = ListingConfig {
            default_limit: env_or("LISTING_DEFAULT_LIMIT", listing_defaults.default_limit),
            max_limit: env_or("LISTING_MAX_LIMIT", listing_defaults.max_limit),
            geo_candidate_limit: env_or(
                "LISTING_GEO_CANDIDATE_LIMIT",
                listing_defaults.geo_candidate_limit,
            ),
            store_timeout: env_millis("STORE_TIMEOUT_MS", listing_defaults.store_timeout),
        };
        if listing.max_limit == 0 || listing.default_limit == 0 {
            anyhow::bail!("LISTING_MAX_LIMIT and LISTING_DEFAULT_LIMIT must be positive");
        }

        let coalescer_defaults = CoalescerConfig::default();
        let retry_defaults = coalescer_defaults.retry.clone();
        let coalescer = CoalescerConfig {
            flush_interval: env_millis(
                "INTERACTION_FLUSH_INTERVAL_MS",
                coalescer_defaults.flush_interval,
            ),
            retry: RetryPolicy {
                max_attempts: env_or("INTERACTION_WRITE_ATTEMPTS", retry_defaults.max_attempts),
                initial_backoff: env_millis(
                    "INTERACTION_RETRY_BACKOFF_MS",
                    retry_defaults.initial_backoff,
                ),
                ..retry_defaults
            },
            max_requeues: env_or("INTERACTION_MAX_REQUEUES", coalescer_defaults.max_requeues),
            write_timeout: env_millis(
                "INTERACTION_WRITE_TIMEOUT_MS",
                coalescer_defaults.write_timeout,
            ),
        };

        let cache = CacheConfig {
            detail_ttl: Duration::from_secs(env_or(
                "DETAIL_CACHE_TTL_SECS",
                CacheConfig::default().detail_ttl.as_secs(),
            )),
        };

        Ok(Config {
            app,
            database,
            redis,
            listing,
            coalescer,
            cache,
        })
    }
}
