mod common;

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{listing_config, north_of, record, store_with};
use listing_service::db::RecordStore;
use listing_service::error::{AppError, Result};
use listing_service::listing::{ListingService, Predicate};
use listing_service::listing::{geo, CursorCodec};
use listing_service::models::{
    CounterKind, GeoPoint, ListingQuery, ListingRecord, OffsetPageData, Sort, SortKey, SortValue,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const AWKWARD_RATINGS: [f64; 5] = [
    1.9359697338339825,
    2.9359697338339825,
    12559.104685644987,
    14719.790529752885,
    0.30000000000000004,
];

fn tied_records() -> Vec<ListingRecord> {
    // Three rows per timestamp and five per like count or rating, so every sort key ties.
    (0..25)
        .map(|i| {
            record(&format!("sp-{:02}", i))
                .created_minutes(i / 3)
                .likes(i % 5)
                .rating(AWKWARD_RATINGS[(i % 5) as usize])
                .build()
        })
        .collect()
}

/// Follow `nextCursor` from `query` until exhaustion and return ids in visit order.
async fn walk(service: &ListingService, query: ListingQuery, max_rows: usize) -> Vec<String> {
    let limit = query.limit.unwrap_or(20) as usize;
    let mut visited = Vec::new();
    let mut cursor = None;
    loop {
        let page = service
            .query(&ListingQuery {
                cursor: cursor.clone(),
                ..query.clone()
            })
            .await
            .unwrap();
        assert!(page.items.len() <= limit);
        visited.extend(page.items.into_iter().map(|item| item.record.id));

        match (page.has_next, page.next_cursor) {
            (true, Some(next)) => cursor = Some(next),
            (false, None) => break,
            other => panic!("hasNext and nextCursor disagree: {:?}", other),
        }
        assert!(visited.len() <= max_rows, "cursor walk did not terminate: {:?}", visited);
    }
    visited
}

fn sorted_walk(sort_by: &str, sort_order: &str, limit: u32) -> ListingQuery {
    ListingQuery {
        sort_by: Some(sort_by.to_string()),
        sort_order: Some(sort_order.to_string()),
        limit: Some(limit),
        ..Default::default()
    }
}

fn expected_order(records: &[ListingRecord], key: SortKey, desc: bool) -> Vec<String> {
    let mut sorted: Vec<&ListingRecord> = records.iter().collect();
    sorted.sort_by(|a, b| {
        a.sort_value(key)
            .compare(&b.sort_value(key))
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    if desc {
        sorted.reverse();
    }
    sorted.into_iter().map(|r| r.id.clone()).collect()
}

fn assert_unique(visited: &[String], context: &str) {
    let unique: HashSet<&String> = visited.iter().collect();
    assert_eq!(unique.len(), visited.len(), "duplicate rows for {}", context);
}

#[tokio::test]
async fn test_cursor_walk_visits_every_row_once_with_ties() {
    let records = tied_records();
    let service = ListingService::new(store_with(records.clone()), listing_config());

    for (sort_by, key) in [
        ("createdAt", SortKey::CreatedAt),
        ("likeCount", SortKey::LikeCount),
        ("rating", SortKey::Rating),
    ] {
        for (order, desc) in [("desc", true), ("asc", false)] {
            let context = format!("{} {}", sort_by, order);
            let visited = walk(&service, sorted_walk(sort_by, order, 4), 25).await;

            assert_unique(&visited, &context);
            assert_eq!(visited, expected_order(&records, key, desc), "{}", context);
        }
    }
}

#[tokio::test]
async fn test_rating_walk_advances_one_row_at_a_time() {
    let service = ListingService::new(
        store_with(vec![
            record("a").rating(1.9359697338339825).build(),
            record("b").rating(2.9359697338339825).build(),
        ]),
        listing_config(),
    );

    let visited = walk(&service, sorted_walk("rating", "asc", 1), 2).await;
    assert_eq!(visited, vec!["a", "b"]);
}

#[tokio::test]
async fn test_malformed_cursor_serves_first_page() {
    let service = ListingService::new(store_with(tied_records()), listing_config());

    let first = service
        .query(&ListingQuery {
            limit: Some(5),
            ..Default::default()
        })
        .await
        .unwrap();
    let with_garbage = service
        .query(&ListingQuery {
            limit: Some(5),
            cursor: Some("%%%not-a-cursor".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(first.items, with_garbage.items);
    assert!(with_garbage.has_next);
}

#[tokio::test]
async fn test_cursor_from_other_sort_key_is_ignored() {
    let service = ListingService::new(store_with(tied_records()), listing_config());

    // A text-valued cursor cannot continue a likeCount sort.
    let foreign = CursorCodec::encode(&SortValue::Text("x".to_string()), "sp-03");
    let page = service
        .query(&ListingQuery {
            sort_by: Some("likeCount".to_string()),
            limit: Some(25),
            cursor: Some(foreign),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(page.items.len(), 25);
    assert!(!page.has_next);
}

#[tokio::test]
async fn test_city_filter_with_offset_pages() {
    let mut records: Vec<ListingRecord> = (0..15)
        .map(|i| record(&format!("sh-{:02}", i)).city("上海市").created_minutes(i).build())
        .collect();
    records.extend((0..5).map(|i| record(&format!("bj-{:02}", i)).city("北京市").build()));
    let service = ListingService::new(store_with(records), listing_config());

    let query = |page| ListingQuery {
        city: Some("上海".to_string()),
        page: Some(page),
        limit: Some(10),
        ..Default::default()
    };

    let first = service.query(&query(1)).await.unwrap();
    assert_eq!(first.items.len(), 10);
    assert_eq!(first.total, Some(15));
    assert!(first.has_next);
    assert!(first.items.iter().all(|i| i.record.id.starts_with("sh-")));
    assert_eq!(first.items[0].record.id, "sh-14");

    let envelope = OffsetPageData::from_page(first, 1, 10);
    assert_eq!(envelope.total_pages, 2);
    assert!(!envelope.has_prev);

    let second = service.query(&query(2)).await.unwrap();
    assert_eq!(second.items.len(), 5);
    assert_eq!(second.total, Some(15));
    assert!(!second.has_next);
    assert!(second.next_cursor.is_none());
}

#[tokio::test]
async fn test_keyword_matches_title_and_tags() {
    let service = ListingService::new(
        store_with(vec![
            record("a").title("Genshin Raiden makeup").build(),
            record("b").tags(&["genshin"]).build(),
            record("c").title("Wig styling").build(),
        ]),
        listing_config(),
    );

    let page = service
        .query(&ListingQuery {
            keyword: Some("genshin".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    let ids: HashSet<String> = page.items.into_iter().map(|i| i.record.id).collect();
    assert_eq!(ids, HashSet::from(["a".to_string(), "b".to_string()]));
}

#[tokio::test]
async fn test_include_total_in_cursor_mode_ignores_keyset() {
    let service = ListingService::new(store_with(tied_records()), listing_config());

    let first = service
        .query(&ListingQuery {
            limit: Some(10),
            include_total: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(first.total, Some(25));

    let second = service
        .query(&ListingQuery {
            limit: Some(10),
            include_total: true,
            cursor: first.next_cursor,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(second.total, Some(25));
    assert_eq!(second.items.len(), 10);
}

fn geo_records(center: GeoPoint) -> Vec<ListingRecord> {
    vec![
        record("far").at(north_of(center, 10.0)).build(),
        record("near").at(north_of(center, 0.5)).build(),
        record("mid").at(north_of(center, 4.9)).build(),
        record("nowhere").build(),
    ]
}

#[tokio::test]
async fn test_geo_radius_orders_by_distance() {
    let center = GeoPoint::new(31.2304, 121.4737);
    let service = ListingService::new(store_with(geo_records(center)), listing_config());

    let page = service
        .query(&ListingQuery {
            lat: Some(center.lat),
            lng: Some(center.lng),
            radius_km: Some(5.0),
            sort_by: Some("likeCount".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    let ids: Vec<&str> = page.items.iter().map(|i| i.record.id.as_str()).collect();
    assert_eq!(ids, vec!["near", "mid"]);

    let distances: Vec<f64> = page.items.iter().filter_map(|i| i.distance_km).collect();
    assert!((distances[0] - 0.5).abs() < 0.01);
    assert!((distances[1] - 4.9).abs() < 0.01);
}

#[tokio::test]
async fn test_geo_cursor_continues_by_distance() {
    let center = GeoPoint::new(31.2304, 121.4737);
    let records: Vec<ListingRecord> = (1..=7)
        .map(|i| record(&format!("g-{}", i)).at(north_of(center, i as f64)).build())
        .collect();
    let service = ListingService::new(store_with(records), listing_config());

    let query = |cursor: Option<String>| ListingQuery {
        lat: Some(center.lat),
        lng: Some(center.lng),
        radius_km: Some(50.0),
        limit: Some(3),
        cursor,
        ..Default::default()
    };

    let mut visited = Vec::new();
    let mut cursor = None;
    loop {
        let page = service.query(&query(cursor)).await.unwrap();
        visited.extend(page.items.into_iter().map(|i| i.record.id));
        if !page.has_next {
            break;
        }
        cursor = page.next_cursor;
    }

    assert_eq!(visited, vec!["g-1", "g-2", "g-3", "g-4", "g-5", "g-6", "g-7"]);
}

#[tokio::test]
async fn test_centre_without_radius_ranks_everything() {
    let center = GeoPoint::new(31.2304, 121.4737);
    let service = ListingService::new(store_with(geo_records(center)), listing_config());
    let centre_only = ListingQuery {
        lat: Some(center.lat),
        lng: Some(center.lng),
        ..Default::default()
    };

    let page = service.query(&centre_only).await.unwrap();

    let ids: Vec<&str> = page.items.iter().map(|i| i.record.id.as_str()).collect();
    assert_eq!(ids, vec!["near", "mid", "far", "nowhere"]);
    assert!(page.items[..3].iter().all(|i| i.distance_km.is_some()));
    assert_eq!(page.items[3].distance_km, None);

    // One row per page puts the unlocated record behind a cursor of its own.
    let visited = walk(
        &service,
        ListingQuery {
            limit: Some(1),
            ..centre_only
        },
        4,
    )
    .await;
    assert_eq!(visited, vec!["near", "mid", "far", "nowhere"]);
}

#[tokio::test]
async fn test_radius_without_centre_is_ignored() {
    let center = GeoPoint::new(31.2304, 121.4737);
    let service = ListingService::new(store_with(geo_records(center)), listing_config());

    let page = service
        .query(&ListingQuery {
            lat: Some(center.lat),
            radius_km: Some(5.0),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(page.items.len(), 4);
    assert!(page.items.iter().all(|i| i.distance_km.is_none()));
}

fn scattered_records(center: GeoPoint, rng: &mut StdRng) -> Vec<ListingRecord> {
    let mut records: Vec<ListingRecord> = (0..40)
        .map(|i| {
            let point = GeoPoint::new(
                center.lat + rng.gen_range(-0.6..0.6),
                center.lng + rng.gen_range(-0.6..0.6),
            );
            record(&format!("geo-{:02}", i)).at(point).build()
        })
        .collect();

    // Shared positions force distance ties that only the id can break.
    for i in 0..6 {
        let twin = records[i].location().unwrap();
        records.push(record(&format!("twin-{:02}", i)).at(twin).build());
    }
    records.extend((0..3).map(|i| record(&format!("nowhere-{}", i)).build()));
    records
}

#[tokio::test]
async fn test_geo_walk_over_scattered_points() {
    let center = GeoPoint::new(31.2304, 121.4737);
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for round in 0..5 {
        let records = scattered_records(center, &mut rng);
        let service = ListingService::new(store_with(records.clone()), listing_config());

        for radius_km in [Some(50.0), None] {
            let context = format!("round {} radius {:?}", round, radius_km);
            let expected: Vec<String> = geo::rank(records.clone(), center, radius_km)
                .into_iter()
                .map(|r| r.item.id)
                .collect();

            let visited = walk(
                &service,
                ListingQuery {
                    lat: Some(center.lat),
                    lng: Some(center.lng),
                    radius_km,
                    limit: Some(3),
                    ..Default::default()
                },
                records.len(),
            )
            .await;

            assert_unique(&visited, &context);
            assert_eq!(visited, expected, "{}", context);
        }
    }
}

/// Never answers a read within any reasonable time
struct StalledStore;

#[async_trait]
impl RecordStore for StalledStore {
    async fn find(&self, _: &Predicate, _: &Sort, _: u64, _: u64) -> Result<Vec<ListingRecord>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Vec::new())
    }

    async fn count(&self, _: &Predicate) -> Result<u64> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(0)
    }

    async fn find_by_id(&self, _: &str) -> Result<Option<ListingRecord>> {
        Ok(None)
    }

    async fn increment(&self, _: &str, _: CounterKind, _: i64) -> Result<()> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_store_timeout_surfaces_as_error() {
    let service = ListingService::new(Arc::new(StalledStore), listing_config());

    let result = service.query(&ListingQuery::default()).await;
    assert!(matches!(result, Err(AppError::Timeout(_))));

    let err = result.unwrap_err();
    assert_eq!(err.code(), "FETCH_TIMEOUT");
    assert!(err.is_transient());
}
