/// Interaction write-coalescer
///
/// Likes, collects and views arrive far more often than the store should be
/// written. Deltas are merged per `(entity, counter)` in an owned buffer and
/// flushed as one increment per pair after a debounce window.
///
/// Lifecycle: Idle -> Armed (first delta schedules the timer) -> Flushing
/// (timer fired or `flush_now`) -> Idle.
///
/// - At most one timer is armed and at most one flush is in flight.
/// - A flush takes the whole buffer in one step; deltas recorded while it
///   runs go to the next cycle.
/// - A write that still fails after retries is merged back into the buffer,
///   up to `max_requeues` cycles, then dropped and counted. Each failed
///   amount keeps its own cycle count, so deltas recorded after a failure
///   get the full budget instead of inheriting the failed one's.
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::config::CoalescerConfig;
use crate::db::RecordStore;
use crate::metrics;
use crate::models::{CounterKind, InteractionDelta};
use crate::resilience::{retry, with_timeout};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DeltaKey {
    entity_id: String,
    kind: CounterKind,
}

#[derive(Debug, Clone, Default)]
struct PendingDelta {
    /// Recorded since the last flush attempt
    fresh: i64,
    /// Amounts merged back after failed flushes, keyed by cycles failed
    retried: BTreeMap<u32, i64>,
}

impl PendingDelta {
    /// What one increment writes for this pair
    fn net(&self) -> i64 {
        self.fresh + self.retried.values().sum::<i64>()
    }

    /// Amounts still inside the re-queue budget, aged by one cycle, and the
    /// amount that ran out of budget.
    fn after_failure(self, max_requeues: u32) -> (BTreeMap<u32, i64>, i64) {
        let mut kept = BTreeMap::new();
        let mut exhausted = 0;
        let parts = std::iter::once((0, self.fresh)).chain(self.retried);
        for (requeues, delta) in parts.filter(|(_, delta)| *delta != 0) {
            if requeues >= max_requeues {
                exhausted += delta;
            } else {
                *kept.entry(requeues + 1).or_insert(0) += delta;
            }
        }
        kept.retain(|_, delta| *delta != 0);
        (kept, exhausted)
    }
}

#[derive(Default)]
struct BufferState {
    pending: HashMap<DeltaKey, PendingDelta>,
    timer: Option<JoinHandle<()>>,
}

struct Inner {
    store: Arc<dyn RecordStore>,
    config: CoalescerConfig,
    state: Mutex<BufferState>,
    flush_lock: tokio::sync::Mutex<()>,
}

/// Outcome of one flush cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Increments written to the store
    pub applied: usize,
    /// Failed pairs with some amount merged back for the next cycle
    pub requeued: usize,
    /// Failed pairs with some amount discarded after `max_requeues`.
    /// A pair whose older amount ran out of budget while a newer one did
    /// not counts in both `requeued` and `dropped`.
    pub dropped: usize,
}

#[derive(Clone, Copy)]
enum Trigger {
    Timer,
    Manual,
}

impl Trigger {
    fn as_str(&self) -> &'static str {
        match self {
            Trigger::Timer => "timer",
            Trigger::Manual => "manual",
        }
    }
}

/// Cheap to clone; clones share one buffer.
#[derive(Clone)]
pub struct InteractionCoalescer {
    inner: Arc<Inner>,
}

impl InteractionCoalescer {
    pub fn new(store: Arc<dyn RecordStore>, config: CoalescerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                config,
                state: Mutex::new(BufferState::default()),
                flush_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Buffer a counter delta and arm the flush timer if it is idle.
    pub fn record(&self, entity_id: &str, kind: CounterKind, delta: i64) {
        if delta == 0 {
            return;
        }

        let mut state = self.inner.state.lock();
        state
            .pending
            .entry(DeltaKey {
                entity_id: entity_id.to_string(),
                kind,
            })
            .or_default()
            .fresh += delta;
        self.arm_timer(&mut state);
    }

    pub fn record_delta(&self, delta: &InteractionDelta) {
        self.record(&delta.entity_id, delta.kind, delta.delta);
    }

    pub fn like(&self, entity_id: &str) {
        self.record(entity_id, CounterKind::Like, 1);
    }

    pub fn unlike(&self, entity_id: &str) {
        self.record(entity_id, CounterKind::Like, -1);
    }

    pub fn collect(&self, entity_id: &str) {
        self.record(entity_id, CounterKind::Collect, 1);
    }

    pub fn uncollect(&self, entity_id: &str) {
        self.record(entity_id, CounterKind::Collect, -1);
    }

    pub fn record_view(&self, entity_id: &str) {
        self.record(entity_id, CounterKind::View, 1);
    }

    /// Net delta currently buffered for one counter
    pub fn pending_delta(&self, entity_id: &str, kind: CounterKind) -> i64 {
        let key = DeltaKey {
            entity_id: entity_id.to_string(),
            kind,
        };
        self.inner
            .state
            .lock()
            .pending
            .get(&key)
            .map(PendingDelta::net)
            .unwrap_or(0)
    }

    /// Number of buffered `(entity, counter)` pairs
    pub fn pending_len(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn is_armed(&self) -> bool {
        self.inner.state.lock().timer.is_some()
    }

    /// Flush immediately, without waiting for the timer.
    pub async fn flush_now(&self) -> FlushReport {
        self.flush(Trigger::Manual).await
    }

    /// Cancel the timer and drain what is buffered; used on shutdown.
    pub async fn shutdown(&self) -> FlushReport {
        if let Some(timer) = self.inner.state.lock().timer.take() {
            timer.abort();
        }
        let report = self.flush_now().await;
        if report.requeued > 0 {
            warn!(
                requeued = report.requeued,
                "interaction deltas still pending at shutdown"
            );
        }
        report
    }

    fn arm_timer(&self, state: &mut BufferState) {
        if state.timer.is_some() {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no tokio runtime, interaction deltas wait for an explicit flush");
            return;
        };

        let coalescer = self.clone();
        let window = self.inner.config.flush_interval;
        state.timer = Some(runtime.spawn(async move {
            tokio::time::sleep(window).await;
            coalescer.flush(Trigger::Timer).await;
        }));
    }

    async fn flush(&self, trigger: Trigger) -> FlushReport {
        let _in_flight = self.inner.flush_lock.lock().await;

        let snapshot = {
            let mut state = self.inner.state.lock();
            if matches!(trigger, Trigger::Timer) {
                state.timer = None;
            }
            std::mem::take(&mut state.pending)
        };

        let writes = snapshot
            .into_iter()
            .filter(|(_, pending)| pending.net() != 0)
            .map(|(key, pending)| {
                let store = Arc::clone(&self.inner.store);
                let config = &self.inner.config;
                async move {
                    let delta = pending.net();
                    let result = retry(&config.retry, || {
                        with_timeout(
                            config.write_timeout,
                            store.increment(&key.entity_id, key.kind, delta),
                        )
                    })
                    .await;
                    (key, pending, result)
                }
            });

        let mut report = FlushReport::default();
        let mut failed = Vec::new();
        for (key, pending, result) in join_all(writes).await {
            let e = match result {
                Ok(()) => {
                    report.applied += 1;
                    continue;
                }
                Err(e) => e,
            };

            let delta = pending.net();
            let (kept, exhausted) = pending.after_failure(self.inner.config.max_requeues);
            if exhausted != 0 {
                error!(
                    entity_id = %key.entity_id,
                    counter = key.kind.as_str(),
                    delta = exhausted,
                    error = %e,
                    "dropping interaction delta after repeated flush failures"
                );
                report.dropped += 1;
            }
            if !kept.is_empty() {
                warn!(
                    entity_id = %key.entity_id,
                    counter = key.kind.as_str(),
                    delta,
                    requeued = delta - exhausted,
                    error = %e,
                    "interaction flush failed, re-queueing delta"
                );
                failed.push((key, kept));
            }
        }

        if !failed.is_empty() {
            report.requeued = failed.len();
            let mut state = self.inner.state.lock();
            for (key, kept) in failed {
                let slot = state.pending.entry(key).or_default();
                for (requeues, delta) in kept {
                    *slot.retried.entry(requeues).or_insert(0) += delta;
                }
            }
            self.arm_timer(&mut state);
        }

        metrics::record_flush(
            trigger.as_str(),
            report.applied,
            report.requeued,
            report.dropped,
        );
        debug!(
            trigger = trigger.as_str(),
            applied = report.applied,
            requeued = report.requeued,
            dropped = report.dropped,
            "interaction buffer flushed"
        );
        report
    }
}
