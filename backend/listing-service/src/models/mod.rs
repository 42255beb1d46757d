/// Data models for listing-service
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;

pub mod response;

pub use response::{ApiResponse, CursorPageData, OffsetPageData};

/// Listing collections served by the engine; one engine instance per collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    SkillPost,
    Post,
}

impl Collection {
    pub const ALL: [Collection; 2] = [Collection::SkillPost, Collection::Post];

    pub fn table(&self) -> &'static str {
        match self {
            Collection::SkillPost => "skill_posts",
            Collection::Post => "posts",
        }
    }

    /// Namespace used in cache keys and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::SkillPost => "skill_post",
            Collection::Post => "post",
        }
    }

    /// URL path segment (`/api/v1/skill-posts`)
    pub fn path_segment(&self) -> &'static str {
        match self {
            Collection::SkillPost => "skill-posts",
            Collection::Post => "posts",
        }
    }

    pub fn from_path_segment(segment: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.path_segment() == segment)
    }
}

/// A WGS84 coordinate pair (degrees)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// A skill post or feed post row as held by the record store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ListingRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub category: Option<String>,
    pub role: Option<String>,
    pub city: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub content: Option<String>,
    pub tags: Vec<String>,
    pub author_id: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub view_count: i64,
    pub like_count: i64,
    pub collect_count: i64,
    pub rating: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ListingRecord {
    /// Both coordinates, or nothing
    pub fn location(&self) -> Option<GeoPoint> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
            _ => None,
        }
    }

    pub fn sort_value(&self, key: SortKey) -> SortValue {
        match key {
            SortKey::CreatedAt => SortValue::Timestamp(self.created_at),
            SortKey::UpdatedAt => SortValue::Timestamp(self.updated_at),
            SortKey::ViewCount => SortValue::Int(self.view_count),
            SortKey::LikeCount => SortValue::Int(self.like_count),
            SortKey::Rating => SortValue::Float(self.rating),
        }
    }

    pub fn counter(&self, kind: CounterKind) -> i64 {
        match kind {
            CounterKind::Like => self.like_count,
            CounterKind::Collect => self.collect_count,
            CounterKind::View => self.view_count,
        }
    }

    pub fn counter_mut(&mut self, kind: CounterKind) -> &mut i64 {
        match kind {
            CounterKind::Like => &mut self.like_count,
            CounterKind::Collect => &mut self.collect_count,
            CounterKind::View => &mut self.view_count,
        }
    }
}

/// Counters that interactions mutate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterKind {
    Like,
    Collect,
    View,
}

impl CounterKind {
    pub fn column(&self) -> &'static str {
        match self {
            CounterKind::Like => "like_count",
            CounterKind::Collect => "collect_count",
            CounterKind::View => "view_count",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CounterKind::Like => "like",
            CounterKind::Collect => "collect",
            CounterKind::View => "view",
        }
    }
}

/// One counter mutation, as recorded by an interaction event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionDelta {
    pub entity_id: String,
    pub kind: CounterKind,
    pub delta: i64,
}

/// Sortable fields (allow-list)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortKey {
    CreatedAt,
    UpdatedAt,
    ViewCount,
    LikeCount,
    Rating,
}

impl SortKey {
    /// Accepts the camelCase names clients send and their snake_case columns.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "createdAt" | "created_at" => Some(SortKey::CreatedAt),
            "updatedAt" | "updated_at" => Some(SortKey::UpdatedAt),
            "viewCount" | "view_count" => Some(SortKey::ViewCount),
            "likeCount" | "like_count" => Some(SortKey::LikeCount),
            "rating" => Some(SortKey::Rating),
            _ => None,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            SortKey::CreatedAt => "created_at",
            SortKey::UpdatedAt => "updated_at",
            SortKey::ViewCount => "view_count",
            SortKey::LikeCount => "like_count",
            SortKey::Rating => "rating",
        }
    }

    /// Whether a cursor value was produced for this key
    pub fn accepts(&self, value: &SortValue) -> bool {
        matches!(
            (self, value),
            (SortKey::CreatedAt | SortKey::UpdatedAt, SortValue::Timestamp(_))
                | (SortKey::ViewCount | SortKey::LikeCount, SortValue::Int(_))
                | (SortKey::Rating, SortValue::Float(_))
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Some(SortDirection::Asc),
            "desc" | "descending" => Some(SortDirection::Desc),
            _ => None,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    /// Orient an ascending comparison
    pub fn apply(&self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl Default for Sort {
    fn default() -> Self {
        Self {
            key: SortKey::CreatedAt,
            direction: SortDirection::Desc,
        }
    }
}

/// The last-seen value of the sort field, as carried in a cursor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
pub enum SortValue {
    Text(String),
    Int(i64),
    Float(f64),
    Timestamp(DateTime<Utc>),
}

impl SortValue {
    /// Ascending comparison; `None` when the variants differ.
    pub fn compare(&self, other: &SortValue) -> Option<Ordering> {
        match (self, other) {
            (SortValue::Text(a), SortValue::Text(b)) => Some(a.cmp(b)),
            (SortValue::Int(a), SortValue::Int(b)) => Some(a.cmp(b)),
            (SortValue::Float(a), SortValue::Float(b)) => Some(a.total_cmp(b)),
            (SortValue::Timestamp(a), SortValue::Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

/// Raw listing request, as received from the HTTP layer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListingQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub category: Option<String>,
    pub role: Option<String>,
    pub city: Option<String>,
    /// Accepts a list or a comma-separated string
    #[serde(deserialize_with = "deserialize_tags")]
    pub tags: Vec<String>,
    pub keyword: Option<String>,
    pub author_id: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub radius_km: Option<f64>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub cursor: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
    /// Ask for a total count in cursor mode (page mode always counts)
    pub include_total: bool,
}

fn deserialize_tags<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Tags {
        List(Vec<String>),
        Joined(String),
    }

    let tags = match Option::<Tags>::deserialize(deserializer)? {
        Some(Tags::List(list)) => list,
        Some(Tags::Joined(joined)) => joined.split(',').map(str::to_string).collect(),
        None => Vec::new(),
    };
    Ok(tags)
}

/// A listing row plus its distance when a geo filter was active
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingItem {
    #[serde(flatten)]
    pub record: ListingRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

impl From<ListingRecord> for ListingItem {
    fn from(record: ListingRecord) -> Self {
        Self {
            record,
            distance_km: None,
        }
    }
}

/// One page of results
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_next: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            has_next: false,
            next_cursor: None,
            total: None,
        }
    }
}

/// Public detail shape returned by the read-through cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingDetail {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub category: Option<String>,
    pub role: Option<String>,
    pub city: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub content: Option<String>,
    pub tags: Vec<String>,
    pub author_id: String,
    pub location: Option<GeoPoint>,
    pub view_count: i64,
    pub like_count: i64,
    pub collect_count: i64,
    pub rating: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ListingRecord> for ListingDetail {
    fn from(record: ListingRecord) -> Self {
        let location = record.location();
        Self {
            id: record.id,
            kind: record.kind,
            category: record.category,
            role: record.role,
            city: record.city,
            title: record.title,
            description: record.description,
            content: record.content,
            tags: record.tags,
            author_id: record.author_id,
            location,
            view_count: record.view_count,
            like_count: record.like_count,
            collect_count: record.collect_count,
            rating: record.rating,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_accept_comma_separated_string() {
        let query: ListingQuery =
            serde_json::from_value(serde_json::json!({ "tags": "cos,摄影", "limit": 5 })).unwrap();
        assert_eq!(query.tags, vec!["cos".to_string(), "摄影".to_string()]);
        assert_eq!(query.limit, Some(5));
    }

    #[test]
    fn test_tags_accept_list_and_type_alias() {
        let query: ListingQuery = serde_json::from_value(serde_json::json!({
            "tags": ["a", "b"],
            "type": "service",
            "radiusKm": 5.0
        }))
        .unwrap();
        assert_eq!(query.tags.len(), 2);
        assert_eq!(query.kind.as_deref(), Some("service"));
        assert_eq!(query.radius_km, Some(5.0));
    }

    #[test]
    fn test_sort_key_allow_list() {
        assert_eq!(SortKey::parse("viewCount"), Some(SortKey::ViewCount));
        assert_eq!(SortKey::parse("price"), None);
        assert!(SortKey::Rating.accepts(&SortValue::Float(4.5)));
        assert!(!SortKey::CreatedAt.accepts(&SortValue::Int(1)));
    }

    #[test]
    fn test_collection_path_segments() {
        assert_eq!(
            Collection::from_path_segment("skill-posts"),
            Some(Collection::SkillPost)
        );
        assert_eq!(Collection::from_path_segment("users"), None);
    }
}
