/// HTTP handlers for listing-service
use std::collections::HashMap;
use std::sync::Arc;

use actix_web::{web, HttpResponse};
use chrono::Utc;

use crate::cache::JsonCache;
use crate::config::Config;
use crate::db::RecordStore;
use crate::error::{AppError, Result};
use crate::listing::ListingService;
use crate::models::Collection;
use crate::services::{DetailService, InteractionCoalescer};

pub mod listings;

pub use listings::{collect, get_listing, like, list_listings, uncollect, unlike};

/// Everything one collection needs, wired to the same store
pub struct CollectionServices {
    pub listing: ListingService,
    pub detail: DetailService,
    pub interactions: InteractionCoalescer,
}

impl CollectionServices {
    pub fn new(
        collection: Collection,
        store: Arc<dyn RecordStore>,
        cache: JsonCache,
        config: &Config,
    ) -> Self {
        let interactions = InteractionCoalescer::new(store.clone(), config.coalescer.clone());
        let detail = DetailService::new(
            collection,
            store.clone(),
            cache,
            interactions.clone(),
            &config.cache,
            config.listing.store_timeout,
        );
        let listing = ListingService::new(store, config.listing.clone());

        Self {
            listing,
            detail,
            interactions,
        }
    }
}

#[derive(Default)]
pub struct AppState {
    collections: HashMap<Collection, CollectionServices>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(mut self, collection: Collection, services: CollectionServices) -> Self {
        self.collections.insert(collection, services);
        self
    }

    pub fn services(&self, collection: Collection) -> Result<&CollectionServices> {
        self.collections
            .get(&collection)
            .ok_or_else(|| AppError::NotFound(format!("{} is not served", collection.as_str())))
    }

    pub fn coalescers(&self) -> Vec<InteractionCoalescer> {
        self.collections
            .values()
            .map(|s| s.interactions.clone())
            .collect()
    }
}

/// GET /api/v1/health
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "listing-service",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Routes under `/api/v1`
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/{collection}", web::get().to(list_listings))
        .route("/{collection}/{id}", web::get().to(get_listing))
        .service(
            web::resource("/{collection}/{id}/like")
                .route(web::post().to(like))
                .route(web::delete().to(unlike)),
        )
        .service(
            web::resource("/{collection}/{id}/collect")
                .route(web::post().to(collect))
                .route(web::delete().to(uncollect)),
        );
}
