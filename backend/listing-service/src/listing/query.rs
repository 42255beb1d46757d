//! Query compiler: raw `ListingQuery` → predicate, sort, page size and mode.
//!
//! Nothing in here fails. Out-of-range limits are clamped, unknown sort keys
//! fall back to `createdAt desc`, malformed cursors and half-specified geo
//! filters are dropped. Each fallback is logged and counted so a flood of
//! stale cursors shows up in metrics without breaking "load more".

use std::cmp::Ordering;

use tracing::warn;

use super::cursor::{Cursor, CursorCodec};
use crate::config::ListingConfig;
use crate::metrics;
use crate::models::{GeoPoint, ListingQuery, ListingRecord, Sort, SortDirection, SortKey, SortValue};

/// Text columns a predicate can address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    Kind,
    Category,
    Role,
    City,
    AuthorId,
    Title,
    Description,
    Content,
}

impl TextField {
    pub fn column(&self) -> &'static str {
        match self {
            TextField::Kind => "kind",
            TextField::Category => "category",
            TextField::Role => "role",
            TextField::City => "city",
            TextField::AuthorId => "author_id",
            TextField::Title => "title",
            TextField::Description => "description",
            TextField::Content => "content",
        }
    }

    fn value<'a>(&self, record: &'a ListingRecord) -> Option<&'a str> {
        match self {
            TextField::Kind => Some(&record.kind),
            TextField::Category => record.category.as_deref(),
            TextField::Role => record.role.as_deref(),
            TextField::City => record.city.as_deref(),
            TextField::AuthorId => Some(&record.author_id),
            TextField::Title => Some(&record.title),
            TextField::Description => record.description.as_deref(),
            TextField::Content => record.content.as_deref(),
        }
    }
}

/// One predicate term; a `Predicate` is the conjunction of its terms.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    /// Exact match
    Equals { field: TextField, value: String },
    /// Case-insensitive substring containment
    Contains { field: TextField, needle: String },
    /// Record tags intersect the given set
    TagsOverlap(Vec<String>),
    /// Record tags include this exact tag
    HasTag(String),
    /// Disjunction
    Any(Vec<Term>),
    /// Keyset continuation: strictly after `(value, id)` in `direction`
    After {
        key: SortKey,
        direction: SortDirection,
        value: SortValue,
        id: String,
    },
}

impl Term {
    pub fn matches(&self, record: &ListingRecord) -> bool {
        match self {
            Term::Equals { field, value } => field.value(record) == Some(value.as_str()),
            Term::Contains { field, needle } => field
                .value(record)
                .map(|haystack| haystack.to_lowercase().contains(&needle.to_lowercase()))
                .unwrap_or(false),
            Term::TagsOverlap(tags) => record.tags.iter().any(|t| tags.contains(t)),
            Term::HasTag(tag) => record.tags.iter().any(|t| t == tag),
            Term::Any(terms) => terms.iter().any(|t| t.matches(record)),
            Term::After {
                key,
                direction,
                value,
                id,
            } => match record.sort_value(*key).compare(value) {
                Some(ordering) => {
                    direction.apply(ordering.then_with(|| record.id.as_str().cmp(id)))
                        == Ordering::Greater
                }
                None => false,
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    pub terms: Vec<Term>,
}

impl Predicate {
    pub fn matches(&self, record: &ListingRecord) -> bool {
        self.terms.iter().all(|t| t.matches(record))
    }

    /// Same filter without the keyset continuation (for totals and geo candidates).
    pub fn without_keyset(&self) -> Predicate {
        Predicate {
            terms: self
                .terms
                .iter()
                .filter(|t| !matches!(t, Term::After { .. }))
                .cloned()
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoFilter {
    pub center: GeoPoint,
    /// Without a radius the centre only orders results; nothing is filtered out
    pub radius_km: Option<f64>,
}

/// Pagination style, resolved once per request; the two never mix.
#[derive(Debug, Clone, PartialEq)]
pub enum PageMode {
    /// Offset pagination; `page` is 1-based
    Page { page: u32 },
    /// Keyset pagination; `after` is `None` on the first page
    Cursor { after: Option<Cursor> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub predicate: Predicate,
    pub sort: Sort,
    pub page_size: u32,
    pub mode: PageMode,
    pub geo: Option<GeoFilter>,
    pub include_total: bool,
}

impl CompiledQuery {
    pub fn mode_label(&self) -> &'static str {
        match (&self.geo, &self.mode) {
            (Some(_), _) => "geo",
            (None, PageMode::Page { .. }) => "page",
            (None, PageMode::Cursor { .. }) => "cursor",
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryCompiler {
    config: ListingConfig,
}

impl QueryCompiler {
    pub fn new(config: ListingConfig) -> Self {
        Self { config }
    }

    pub fn compile(&self, query: &ListingQuery) -> CompiledQuery {
        let mut terms = Vec::new();

        for (field, value) in [
            (TextField::Kind, &query.kind),
            (TextField::Category, &query.category),
            (TextField::Role, &query.role),
            (TextField::AuthorId, &query.author_id),
        ] {
            if let Some(value) = non_blank(value) {
                terms.push(Term::Equals {
                    field,
                    value: value.to_string(),
                });
            }
        }

        if let Some(city) = non_blank(&query.city) {
            terms.push(Term::Contains {
                field: TextField::City,
                needle: city.to_string(),
            });
        }

        let tags = normalize_tags(&query.tags);
        if !tags.is_empty() {
            terms.push(Term::TagsOverlap(tags));
        }

        if let Some(keyword) = non_blank(&query.keyword) {
            terms.push(Term::Any(vec![
                Term::Contains {
                    field: TextField::Title,
                    needle: keyword.to_string(),
                },
                Term::Contains {
                    field: TextField::Description,
                    needle: keyword.to_string(),
                },
                Term::Contains {
                    field: TextField::Content,
                    needle: keyword.to_string(),
                },
                Term::HasTag(keyword.to_string()),
            ]));
        }

        let sort = self.resolve_sort(query);
        let page_size = self.resolve_limit(query.limit);
        let geo = resolve_geo(query);

        let mode = match (non_blank(&query.cursor), query.page) {
            (None, Some(page)) => PageMode::Page { page: page.max(1) },
            (cursor, _) => PageMode::Cursor {
                after: cursor.and_then(|token| accept_cursor(token, sort.key, geo.is_some())),
            },
        };

        // Distance cursors are applied after ranking, never pushed to the store.
        if geo.is_none() {
            if let PageMode::Cursor { after: Some(cursor) } = &mode {
                terms.push(Term::After {
                    key: sort.key,
                    direction: sort.direction,
                    value: cursor.sort_value.clone(),
                    id: cursor.id.clone(),
                });
            }
        }

        CompiledQuery {
            predicate: Predicate { terms },
            sort,
            page_size,
            mode,
            geo,
            include_total: query.include_total,
        }
    }

    fn resolve_sort(&self, query: &ListingQuery) -> Sort {
        let Some(raw_key) = non_blank(&query.sort_by) else {
            return Sort {
                key: SortKey::CreatedAt,
                direction: resolve_direction(query),
            };
        };

        match SortKey::parse(raw_key) {
            Some(key) => Sort {
                key,
                direction: resolve_direction(query),
            },
            None => {
                warn!(sort_by = %raw_key, "unknown sortBy, falling back to createdAt desc");
                metrics::record_degradation("unknown_sort_key");
                Sort::default()
            }
        }
    }

    fn resolve_limit(&self, limit: Option<u32>) -> u32 {
        let max = self.config.max_limit.max(1);
        match limit {
            None => self.config.default_limit.clamp(1, max),
            Some(limit) if (1..=max).contains(&limit) => limit,
            Some(limit) => {
                metrics::record_degradation("limit_clamped");
                limit.clamp(1, max)
            }
        }
    }
}

fn resolve_direction(query: &ListingQuery) -> SortDirection {
    match non_blank(&query.sort_order) {
        None => SortDirection::Desc,
        Some(raw) => SortDirection::parse(raw).unwrap_or_else(|| {
            warn!(sort_order = %raw, "unknown sortOrder, using desc");
            metrics::record_degradation("unknown_sort_order");
            SortDirection::Desc
        }),
    }
}

/// Geo ranking needs a valid centre; a radius, when given, must be positive.
/// A radius without a centre is ignored.
fn resolve_geo(query: &ListingQuery) -> Option<GeoFilter> {
    match (query.lat, query.lng, query.radius_km) {
        (None, None, None) => None,
        (Some(lat), Some(lng), radius_km) => {
            let center = GeoPoint::new(lat, lng);
            let radius_ok = radius_km.map_or(true, |r| r.is_finite() && r > 0.0);
            if center.is_valid() && radius_ok {
                Some(GeoFilter { center, radius_km })
            } else {
                warn!(lat, lng, radius_km = ?radius_km, "invalid geo filter ignored");
                metrics::record_degradation("invalid_geo");
                None
            }
        }
        _ => {
            warn!(
                lat = ?query.lat,
                lng = ?query.lng,
                radius_km = ?query.radius_km,
                "incomplete geo filter ignored"
            );
            metrics::record_degradation("incomplete_geo");
            None
        }
    }
}

/// Decode and type-check a cursor against the sort it will continue.
fn accept_cursor(token: &str, key: SortKey, geo: bool) -> Option<Cursor> {
    let Some(cursor) = CursorCodec::decode(token) else {
        metrics::record_degradation("malformed_cursor");
        return None;
    };

    let fits = if geo {
        matches!(cursor.sort_value, SortValue::Float(d) if d.is_finite() && d >= 0.0)
    } else {
        key.accepts(&cursor.sort_value)
    };

    if fits {
        Some(cursor)
    } else {
        warn!(sort_key = ?key, geo, "cursor does not match current sort, starting from first page");
        metrics::record_degradation("mismatched_cursor");
        None
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        if !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}
