use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use listing_service::cache::{CacheBackend, JsonCache, MemoryCacheBackend, RedisCacheBackend};
use listing_service::db::{PgRecordStore, RecordStore};
use listing_service::handlers::{self, AppState, CollectionServices};
use listing_service::metrics::serve_metrics;
use listing_service::models::Collection;
use listing_service::Config;

async fn build_cache(config: &Config) -> Arc<dyn CacheBackend> {
    let Some(redis) = &config.redis else {
        info!("REDIS_URL not set, using in-process detail cache");
        return Arc::new(MemoryCacheBackend::new());
    };

    match RedisCacheBackend::connect(&redis.url).await {
        Ok(backend) => {
            if let Err(e) = backend.ping().await {
                warn!(error = %e, "Redis ping failed at startup, continuing");
            }
            info!("Detail cache backed by Redis");
            Arc::new(backend)
        }
        Err(e) => {
            warn!(error = %e, "Redis unavailable, falling back to in-process detail cache");
            Arc::new(MemoryCacheBackend::new())
        }
    }
}

#[actix_web::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=debug,sqlx=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_file(true)
                .with_target(true),
        )
        .init();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Configuration loading failed: {:#}", e);
            return Err(e);
        }
    };

    info!(
        env = %config.app.env,
        "Starting listing-service v{}",
        env!("CARGO_PKG_VERSION")
    );

    let pg_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.database.url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    sqlx::migrate!("./migrations")
        .run(&pg_pool)
        .await
        .context("Failed to run database migrations")?;

    let cache = JsonCache::new(build_cache(&config).await);

    let state = Collection::ALL
        .into_iter()
        .fold(AppState::new(), |state, collection| {
            let store: Arc<dyn RecordStore> =
                Arc::new(PgRecordStore::new(pg_pool.clone(), collection));
            state.with_collection(
                collection,
                CollectionServices::new(collection, store, cache.clone(), &config),
            )
        });
    let state = web::Data::new(state);
    let coalescers = state.coalescers();

    let http_addr = format!("{}:{}", config.app.host, config.app.http_port);
    info!("Starting HTTP server on {}", http_addr);

    let server_state = state.clone();
    HttpServer::new(move || {
        App::new()
            .app_data(server_state.clone())
            .wrap(TracingLogger::default())
            .route("/metrics", web::get().to(serve_metrics))
            .service(web::scope("/api/v1").configure(handlers::configure))
    })
    .bind(&http_addr)
    .context("Failed to bind HTTP server")?
    .run()
    .await
    .context("HTTP server error")?;

    info!("HTTP server stopped, draining interaction buffers");
    for coalescer in coalescers {
        let report = coalescer.shutdown().await;
        info!(
            applied = report.applied,
            requeued = report.requeued,
            dropped = report.dropped,
            "interaction buffer drained"
        );
    }

    Ok(())
}
