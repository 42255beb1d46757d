//! In-process record store.
//!
//! Evaluates the same predicates as the Postgres store, including the
//! `(sort key, id)` total order, so pagination behaves identically. Used for
//! local runs without a database and throughout the test suite, which is why
//! it keeps a log of increments and lookups and can be told to fail writes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use super::RecordStore;
use crate::error::{AppError, Result};
use crate::listing::Predicate;
use crate::models::{CounterKind, InteractionDelta, ListingRecord, Sort};

#[derive(Default)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<String, ListingRecord>>,
    increments: Mutex<Vec<InteractionDelta>>,
    lookups: AtomicUsize,
    failing_writes: AtomicUsize,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = ListingRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.insert(record);
        }
        store
    }

    pub fn insert(&self, record: ListingRecord) {
        self.records.write().insert(record.id.clone(), record);
    }

    pub fn get(&self, id: &str) -> Option<ListingRecord> {
        self.records.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every successfully applied increment, in call order
    pub fn applied_increments(&self) -> Vec<InteractionDelta> {
        self.increments.lock().clone()
    }

    /// Number of `find_by_id` calls served
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(AtomicOrdering::SeqCst)
    }

    /// Make the next `n` increment calls fail
    pub fn fail_next_writes(&self, n: usize) {
        self.failing_writes.store(n, AtomicOrdering::SeqCst);
    }

    fn take_write_failure(&self) -> bool {
        self.failing_writes
            .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |n| {
                n.checked_sub(1)
            })
            .is_ok()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn find(
        &self,
        predicate: &Predicate,
        sort: &Sort,
        skip: u64,
        take: u64,
    ) -> Result<Vec<ListingRecord>> {
        let records = self.records.read();
        let mut matching: Vec<&ListingRecord> =
            records.values().filter(|r| predicate.matches(r)).collect();

        matching.sort_by(|a, b| {
            let by_key = a
                .sort_value(sort.key)
                .compare(&b.sort_value(sort.key))
                .unwrap_or(std::cmp::Ordering::Equal);
            sort.direction.apply(by_key.then_with(|| a.id.cmp(&b.id)))
        });

        Ok(matching
            .into_iter()
            .skip(usize::try_from(skip).unwrap_or(usize::MAX))
            .take(usize::try_from(take).unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn count(&self, predicate: &Predicate) -> Result<u64> {
        let records = self.records.read();
        Ok(records.values().filter(|r| predicate.matches(r)).count() as u64)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<ListingRecord>> {
        self.lookups.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(self.get(id))
    }

    async fn increment(&self, id: &str, counter: CounterKind, delta: i64) -> Result<()> {
        if self.take_write_failure() {
            return Err(AppError::StoreUnavailable(format!(
                "injected write failure for {}",
                id
            )));
        }

        if let Some(record) = self.records.write().get_mut(id) {
            let value = record.counter_mut(counter);
            *value = (*value + delta).max(0);
        }
        self.increments.lock().push(InteractionDelta {
            entity_id: id.to_string(),
            kind: counter,
            delta,
        });
        Ok(())
    }
}
