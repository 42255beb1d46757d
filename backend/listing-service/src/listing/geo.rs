//! Great-circle distance ranking for "near me" listings.
//!
//! Ranking runs in memory over the whole candidate set pulled from the store,
//! so it only holds up for small-to-moderate candidate counts; the
//! orchestrator caps that set with `geo_candidate_limit`.

use std::cmp::Ordering;

use crate::models::{GeoPoint, ListingRecord};

/// Mean Earth radius (spherical approximation)
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance in kilometres between two WGS84 points.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lng / 2.0).sin().powi(2);
    // Rounding can push h a hair past 1 for antipodal points.
    2.0 * EARTH_RADIUS_KM * h.clamp(0.0, 1.0).sqrt().asin()
}

/// Distance from `center`; a missing location is infinitely far away.
pub fn distance_km(center: GeoPoint, point: Option<GeoPoint>) -> f64 {
    point
        .map(|p| haversine_km(center, p))
        .unwrap_or(f64::INFINITY)
}

/// Anything with an identity and an optional position.
pub trait Locatable {
    fn id(&self) -> &str;
    fn location(&self) -> Option<GeoPoint>;
}

impl Locatable for ListingRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn location(&self) -> Option<GeoPoint> {
        ListingRecord::location(self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ranked<T> {
    pub item: T,
    pub distance_km: f64,
}

/// Rank records by distance from `center`, nearest first.
///
/// With a radius, records farther away (and records without a location) are
/// dropped. Without one, every record is kept and unlocated records sort last.
/// Ties on distance are broken by id so the order is total, which keeps
/// distance cursors stable across pages.
pub fn rank<T: Locatable>(records: Vec<T>, center: GeoPoint, radius_km: Option<f64>) -> Vec<Ranked<T>> {
    let mut ranked: Vec<Ranked<T>> = records
        .into_iter()
        .filter_map(|item| {
            let distance_km = distance_km(center, item.location());
            let within = radius_km.map_or(true, |radius| distance_km <= radius);
            within.then_some(Ranked { item, distance_km })
        })
        .collect();

    ranked.sort_by(|a, b| compare_ranked(a.distance_km, a.item.id(), b.distance_km, b.item.id()));
    ranked
}

/// Distance as carried in a cursor. JSON has no infinity, so unlocated
/// records use `f64::MAX`, which still orders after every real distance.
pub fn cursor_distance(distance_km: f64) -> f64 {
    distance_km.min(f64::MAX)
}

/// Ascending `(distance, id)` order used by ranking and distance cursors.
pub fn compare_ranked(a_distance: f64, a_id: &str, b_distance: f64, b_id: &str) -> Ordering {
    a_distance
        .total_cmp(&b_distance)
        .then_with(|| a_id.cmp(b_id))
}
