/// Listing orchestrator - runs compiled queries against the record store
use std::cmp::Ordering;
use std::sync::Arc;

use tracing::{debug, warn};

use super::cursor::{Cursor, CursorCodec};
use super::geo;
use super::query::{CompiledQuery, GeoFilter, PageMode, QueryCompiler};
use crate::config::ListingConfig;
use crate::db::RecordStore;
use crate::error::Result;
use crate::metrics;
use crate::models::{ListingItem, ListingQuery, ListingRecord, Page, SortValue};
use crate::resilience::with_timeout;

pub struct ListingService {
    store: Arc<dyn RecordStore>,
    compiler: QueryCompiler,
    config: ListingConfig,
}

impl ListingService {
    pub fn new(store: Arc<dyn RecordStore>, config: ListingConfig) -> Self {
        Self {
            store,
            compiler: QueryCompiler::new(config.clone()),
            config,
        }
    }

    pub fn compiler(&self) -> &QueryCompiler {
        &self.compiler
    }

    /// Compile and run a raw query in one step
    pub async fn query(&self, query: &ListingQuery) -> Result<Page<ListingItem>> {
        let compiled = self.compiler.compile(query);
        self.list(&compiled).await
    }

    pub async fn list(&self, compiled: &CompiledQuery) -> Result<Page<ListingItem>> {
        metrics::record_listing_request(compiled.mode_label());

        if let Some(filter) = compiled.geo {
            return self.list_geo(compiled, filter).await;
        }

        match &compiled.mode {
            PageMode::Cursor { .. } => self.list_cursor(compiled).await,
            PageMode::Page { page } => self.list_page(compiled, *page).await,
        }
    }

    /// Keyset page: fetch one extra row to learn whether another page exists.
    async fn list_cursor(&self, compiled: &CompiledQuery) -> Result<Page<ListingItem>> {
        let limit = compiled.page_size as usize;
        let timeout = self.config.store_timeout;

        let mut rows = with_timeout(
            timeout,
            self.store
                .find(&compiled.predicate, &compiled.sort, 0, limit as u64 + 1),
        )
        .await?;

        let total = if compiled.include_total {
            let unpaged = compiled.predicate.without_keyset();
            Some(with_timeout(timeout, self.store.count(&unpaged)).await?)
        } else {
            None
        };

        let has_next = rows.len() > limit;
        rows.truncate(limit);
        let next_cursor = if has_next {
            rows.last()
                .map(|row| CursorCodec::encode(&row.sort_value(compiled.sort.key), &row.id))
        } else {
            None
        };

        debug!(
            returned = rows.len(),
            has_next,
            sort_key = ?compiled.sort.key,
            "cursor page served"
        );

        Ok(Page {
            items: rows.into_iter().map(ListingItem::from).collect(),
            has_next,
            next_cursor,
            total,
        })
    }

    /// Offset page for legacy callers: skip/take plus a count over the same predicate.
    async fn list_page(&self, compiled: &CompiledQuery, page: u32) -> Result<Page<ListingItem>> {
        let limit = u64::from(compiled.page_size);
        let skip = u64::from(page.max(1) - 1) * limit;
        let timeout = self.config.store_timeout;

        let (rows, total) = tokio::try_join!(
            with_timeout(
                timeout,
                self.store.find(&compiled.predicate, &compiled.sort, skip, limit)
            ),
            with_timeout(timeout, self.store.count(&compiled.predicate)),
        )?;

        let has_next = skip + (rows.len() as u64) < total;
        let next_cursor = if has_next {
            rows.last()
                .map(|row| CursorCodec::encode(&row.sort_value(compiled.sort.key), &row.id))
        } else {
            None
        };

        debug!(page, returned = rows.len(), total, has_next, "offset page served");

        Ok(Page {
            items: rows.into_iter().map(ListingItem::from).collect(),
            has_next,
            next_cursor,
            total: Some(total),
        })
    }

    /// Distance-first page. The whole candidate set is ranked in memory, then
    /// paginated; any requested sort order is overridden by distance. Without
    /// a radius, unlocated records come last and carry no `distanceKm`.
    async fn list_geo(&self, compiled: &CompiledQuery, filter: GeoFilter) -> Result<Page<ListingItem>> {
        let cap = u64::from(self.config.geo_candidate_limit.max(1));
        let candidates = with_timeout(
            self.config.store_timeout,
            self.store
                .find(&compiled.predicate.without_keyset(), &compiled.sort, 0, cap),
        )
        .await?;

        if candidates.len() as u64 >= cap {
            warn!(
                cap,
                "geo candidate cap reached, results beyond the cap are not ranked"
            );
        }

        let ranked = geo::rank(candidates, filter.center, filter.radius_km);
        let total = ranked.len() as u64;
        let limit = compiled.page_size as usize;

        let (window, has_next): (Vec<geo::Ranked<ListingRecord>>, bool) = match &compiled.mode {
            PageMode::Page { page } => {
                let skip = ((*page).max(1) - 1) as usize * limit;
                let has_next = skip + limit < ranked.len();
                (ranked.into_iter().skip(skip).take(limit).collect(), has_next)
            }
            PageMode::Cursor { after } => {
                let mut rest: Vec<_> = ranked
                    .into_iter()
                    .filter(|r| is_after_distance_cursor(r, after.as_ref()))
                    .take(limit + 1)
                    .collect();
                let has_next = rest.len() > limit;
                rest.truncate(limit);
                (rest, has_next)
            }
        };

        let next_cursor = if has_next {
            window.last().map(|r| {
                CursorCodec::encode(
                    &SortValue::Float(geo::cursor_distance(r.distance_km)),
                    &r.item.id,
                )
            })
        } else {
            None
        };

        let include_total =
            compiled.include_total || matches!(compiled.mode, PageMode::Page { .. });

        Ok(Page {
            items: window
                .into_iter()
                .map(|r| ListingItem {
                    record: r.item,
                    distance_km: r.distance_km.is_finite().then_some(r.distance_km),
                })
                .collect(),
            has_next,
            next_cursor,
            total: include_total.then_some(total),
        })
    }
}

fn is_after_distance_cursor(ranked: &geo::Ranked<ListingRecord>, after: Option<&Cursor>) -> bool {
    let Some(cursor) = after else {
        return true;
    };
    let SortValue::Float(distance) = &cursor.sort_value else {
        return true;
    };
    geo::compare_ranked(
        geo::cursor_distance(ranked.distance_km),
        &ranked.item.id,
        *distance,
        &cursor.id,
    ) == Ordering::Greater
}
