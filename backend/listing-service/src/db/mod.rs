/// Record store boundary
///
/// The engine only needs equality/substring/tag/keyset predicates, sorted
/// skip/take pages, a count, a single-row lookup and counter increments.
/// `PgRecordStore` serves production; `MemoryRecordStore` evaluates the same
/// predicates in process for local runs and tests.
use async_trait::async_trait;

use crate::error::Result;
use crate::listing::Predicate;
use crate::models::{CounterKind, ListingRecord, Sort};

pub mod memory_store;
pub mod pg_store;

pub use memory_store::MemoryRecordStore;
pub use pg_store::PgRecordStore;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Rows matching `predicate`, ordered by `(sort.key, id)` in `sort.direction`.
    async fn find(
        &self,
        predicate: &Predicate,
        sort: &Sort,
        skip: u64,
        take: u64,
    ) -> Result<Vec<ListingRecord>>;

    async fn count(&self, predicate: &Predicate) -> Result<u64>;

    async fn find_by_id(&self, id: &str) -> Result<Option<ListingRecord>>;

    /// Add `delta` to one counter; counters never drop below zero.
    async fn increment(&self, id: &str, counter: CounterKind, delta: i64) -> Result<()>;
}
