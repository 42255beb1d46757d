//! Prometheus metrics for listing-service.
//!
//! Exposes listing, coalescer and detail-cache collectors and an HTTP handler
//! for the `/metrics` endpoint.

use actix_web::HttpResponse;
use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};

lazy_static! {
    /// Listing requests by pagination mode (cursor, page, geo).
    pub static ref LISTING_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "listing_requests_total",
        "Listing requests segmented by pagination mode",
        &["mode"]
    )
    .expect("failed to register listing_requests_total");

    /// Malformed listing inputs that were degraded to a default.
    pub static ref QUERY_DEGRADATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "listing_query_degradations_total",
        "Listing query inputs replaced by a documented default",
        &["reason"]
    )
    .expect("failed to register listing_query_degradations_total");

    /// Coalescer delta outcomes per flush (applied, requeued, dropped).
    pub static ref INTERACTION_FLUSH_DELTAS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "interaction_flush_deltas_total",
        "Buffered interaction deltas segmented by flush outcome",
        &["outcome"]
    )
    .expect("failed to register interaction_flush_deltas_total");

    /// Completed flush cycles by trigger (timer, manual).
    pub static ref INTERACTION_FLUSHES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "interaction_flushes_total",
        "Interaction buffer flush cycles segmented by trigger",
        &["trigger"]
    )
    .expect("failed to register interaction_flushes_total");

    /// Detail cache events (hit/miss/error/write_error).
    pub static ref DETAIL_CACHE_EVENTS: IntCounterVec = register_int_counter_vec!(
        "detail_cache_events_total",
        "Detail cache events segmented by outcome",
        &["collection", "event"]
    )
    .expect("failed to register detail_cache_events_total");
}

pub fn record_degradation(reason: &str) {
    QUERY_DEGRADATIONS_TOTAL.with_label_values(&[reason]).inc();
}

pub fn record_listing_request(mode: &str) {
    LISTING_REQUESTS_TOTAL.with_label_values(&[mode]).inc();
}

pub fn record_flush(trigger: &str, applied: usize, requeued: usize, dropped: usize) {
    INTERACTION_FLUSHES_TOTAL.with_label_values(&[trigger]).inc();
    for (outcome, count) in [
        ("applied", applied),
        ("requeued", requeued),
        ("dropped", dropped),
    ] {
        if count > 0 {
            INTERACTION_FLUSH_DELTAS_TOTAL
                .with_label_values(&[outcome])
                .inc_by(count as u64);
        }
    }
}

pub fn record_cache_event(collection: &str, event: &str) {
    DETAIL_CACHE_EVENTS
        .with_label_values(&[collection, event])
        .inc();
}

/// Actix handler that renders Prometheus metrics in text format.
pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
