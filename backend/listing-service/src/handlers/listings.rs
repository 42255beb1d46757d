use actix_web::{web, HttpResponse};
use serde::Serialize;
use tracing::debug;

use super::AppState;
use crate::error::{AppError, Result};
use crate::listing::PageMode;
use crate::models::{
    ApiResponse, Collection, CounterKind, CursorPageData, ListingQuery, OffsetPageData,
};

fn collection_from_path(segment: &str) -> Result<Collection> {
    Collection::from_path_segment(segment)
        .ok_or_else(|| AppError::NotFound(format!("unknown collection '{}'", segment)))
}

/// GET /api/v1/{collection}
pub async fn list_listings(
    path: web::Path<String>,
    query: web::Query<ListingQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let collection = collection_from_path(&path)?;
    let services = state.services(collection)?;

    let compiled = services.listing.compiler().compile(&query);
    debug!(
        collection = collection.as_str(),
        mode = compiled.mode_label(),
        limit = compiled.page_size,
        "listing request"
    );
    let page = services.listing.list(&compiled).await?;

    let body = match compiled.mode {
        PageMode::Page { page: page_no } => HttpResponse::Ok().json(ApiResponse::ok(
            OffsetPageData::from_page(page, page_no, compiled.page_size),
        )),
        PageMode::Cursor { .. } => {
            HttpResponse::Ok().json(ApiResponse::ok(CursorPageData::from(page)))
        }
    };
    Ok(body)
}

/// GET /api/v1/{collection}/{id}
pub async fn get_listing(
    path: web::Path<(String, String)>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let (segment, id) = path.into_inner();
    let services = state.services(collection_from_path(&segment)?)?;
    let detail = services.detail.get_detail(&id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(detail)))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InteractionAccepted {
    entity_id: String,
    kind: CounterKind,
    delta: i64,
}

async fn record_interaction(
    segment: &str,
    id: String,
    kind: CounterKind,
    delta: i64,
    state: &AppState,
) -> Result<HttpResponse> {
    let services = state.services(collection_from_path(segment)?)?;
    services.interactions.record(&id, kind, delta);
    Ok(HttpResponse::Accepted().json(ApiResponse::with_message(
        InteractionAccepted {
            entity_id: id,
            kind,
            delta,
        },
        "queued",
    )))
}

/// POST /api/v1/{collection}/{id}/like
pub async fn like(path: web::Path<(String, String)>, state: web::Data<AppState>) -> Result<HttpResponse> {
    let (segment, id) = path.into_inner();
    record_interaction(&segment, id, CounterKind::Like, 1, &state).await
}

/// DELETE /api/v1/{collection}/{id}/like
pub async fn unlike(path: web::Path<(String, String)>, state: web::Data<AppState>) -> Result<HttpResponse> {
    let (segment, id) = path.into_inner();
    record_interaction(&segment, id, CounterKind::Like, -1, &state).await
}

/// POST /api/v1/{collection}/{id}/collect
pub async fn collect(path: web::Path<(String, String)>, state: web::Data<AppState>) -> Result<HttpResponse> {
    let (segment, id) = path.into_inner();
    record_interaction(&segment, id, CounterKind::Collect, 1, &state).await
}

/// DELETE /api/v1/{collection}/{id}/collect
pub async fn uncollect(
    path: web::Path<(String, String)>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let (segment, id) = path.into_inner();
    record_interaction(&segment, id, CounterKind::Collect, -1, &state).await
}
