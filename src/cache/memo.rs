//! Memoizing cache with single-flight computation and event invalidation.
//!
//! Each registered key owns a slot whose short synchronous lock guards one of
//! three states: empty, pending (a shared in-flight computation) or ready.
//! The lock is never held across an `.await`, and keys never share a lock.

use std::any::Any;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::error::Error as StdError;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use metrics::counter;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use super::config::CacheConfig;
use super::events::{Epoch, Invalidation};
use super::keys::{CacheKey, InvalidationEvent};
use super::lock::{mutex_lock, rw_read, rw_write};

const SOURCE: &str = "cache::memo";

pub(crate) const METRIC_HIT: &str = "quire_memo_hit_total";
pub(crate) const METRIC_MISS: &str = "quire_memo_miss_total";
pub(crate) const METRIC_COALESCED: &str = "quire_memo_coalesced_total";
pub(crate) const METRIC_PRODUCER_ERROR: &str = "quire_memo_producer_error_total";
pub(crate) const METRIC_INVALIDATED: &str = "quire_memo_invalidated_total";

type ErasedValue = Arc<dyn Any + Send + Sync>;

/// Error raised by a producer, shared between every coalesced caller.
pub type ProducerFailure = Arc<dyn StdError + Send + Sync>;

type Computation = Shared<BoxFuture<'static, Result<ErasedValue, ProducerFailure>>>;

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("cache key `{key}` was used before being registered")]
    Unregistered { key: CacheKey },
    #[error("producer for cache key `{key}` failed: {source}")]
    Producer {
        key: CacheKey,
        #[source]
        source: ProducerFailure,
    },
    #[error("cache key `{key}` holds a value of a different type")]
    TypeMismatch { key: CacheKey },
}

enum SlotState {
    Empty,
    Pending {
        ticket: u64,
        computation: Computation,
    },
    Ready(ErasedValue),
}

impl SlotState {
    fn label(&self) -> EntryState {
        match self {
            SlotState::Empty => EntryState::Empty,
            SlotState::Pending { .. } => EntryState::Pending,
            SlotState::Ready(_) => EntryState::Ready,
        }
    }
}

struct Slot {
    state: Mutex<SlotState>,
}

/// Observable state of one cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    Empty,
    Pending,
    Ready,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntrySnapshot {
    pub key: CacheKey,
    pub state: EntryState,
    pub events: Vec<InvalidationEvent>,
}

/// Process-wide memoizing cache.
///
/// Constructed once at service start and shared through `Arc`. Keys must be
/// registered under their invalidation events before first use.
pub struct MemoCache {
    config: CacheConfig,
    slots: DashMap<CacheKey, Arc<Slot>>,
    subscriptions: RwLock<HashMap<InvalidationEvent, HashSet<CacheKey>>>,
    tickets: AtomicU64,
    epochs: AtomicU64,
}

impl MemoCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            slots: DashMap::new(),
            subscriptions: RwLock::new(HashMap::new()),
            tickets: AtomicU64::new(0),
            epochs: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Subscribe `key` to `event`. A key may subscribe to several events.
    pub fn register(&self, key: CacheKey, event: InvalidationEvent) {
        self.slots.entry(key.clone()).or_insert_with(|| {
            Arc::new(Slot {
                state: Mutex::new(SlotState::Empty),
            })
        });

        debug!(key = %key, event = %event, "cache key registered");
        rw_write(&self.subscriptions, SOURCE, "register")
            .entry(event)
            .or_default()
            .insert(key);
    }

    /// Return the cached value for `key`, computing it with `producer` when
    /// the entry is not valid.
    ///
    /// Concurrent callers that find a computation in flight await it instead
    /// of invoking their own producer.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &CacheKey,
        producer: F,
    ) -> Result<Arc<T>, CacheError>
    where
        T: Send + Sync + 'static,
        E: StdError + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let slot = self.slot(key)?;

        if !self.config.enabled {
            return producer().await.map(Arc::new).map_err(|err| {
                counter!(METRIC_PRODUCER_ERROR).increment(1);
                CacheError::Producer {
                    key: key.clone(),
                    source: Arc::new(err),
                }
            });
        }

        let (ticket, computation) = {
            let mut state = mutex_lock(&slot.state, SOURCE, "get_or_compute");
            match &*state {
                SlotState::Ready(value) => {
                    counter!(METRIC_HIT).increment(1);
                    debug!(cache = "memo", key = %key, outcome = "hit", "serving memoized value");
                    return downcast(key, value.clone());
                }
                SlotState::Pending {
                    ticket,
                    computation,
                } => {
                    counter!(METRIC_COALESCED).increment(1);
                    debug!(cache = "memo", key = %key, outcome = "coalesced", "awaiting in-flight computation");
                    (*ticket, computation.clone())
                }
                SlotState::Empty => {
                    counter!(METRIC_MISS).increment(1);
                    debug!(cache = "memo", key = %key, outcome = "miss", "computing value");
                    let ticket = self.tickets.fetch_add(1, Ordering::SeqCst);
                    // The producer is only invoked on first poll, outside the slot lock.
                    let computation = async move {
                        match producer().await {
                            Ok(value) => Ok(Arc::new(value) as ErasedValue),
                            Err(err) => Err(Arc::new(err) as ProducerFailure),
                        }
                    }
                    .boxed()
                    .shared();
                    *state = SlotState::Pending {
                        ticket,
                        computation: computation.clone(),
                    };
                    (ticket, computation)
                }
            }
        };

        let result = computation.await;
        self.settle(key, &slot, ticket, &result);

        match result {
            Ok(value) => downcast(key, value),
            Err(source) => Err(CacheError::Producer {
                key: key.clone(),
                source,
            }),
        }
    }

    /// Mark every key subscribed to `event` for recompute.
    ///
    /// In-flight computations keep running and still answer the callers
    /// already awaiting them; their result is simply not stored.
    pub fn invalidate(&self, event: &InvalidationEvent) -> Invalidation {
        let keys = rw_read(&self.subscriptions, SOURCE, "invalidate")
            .get(event)
            .cloned()
            .unwrap_or_default();

        for key in &keys {
            self.invalidate_key(key);
        }

        let record = Invalidation::new(event.clone(), self.next_epoch(), keys.len());
        record.log();
        record
    }

    /// Mark a single key for recompute. Returns false for unknown keys.
    pub fn invalidate_key(&self, key: &CacheKey) -> bool {
        let Some(slot) = self.slots.get(key).map(|entry| Arc::clone(entry.value())) else {
            return false;
        };

        let mut state = mutex_lock(&slot.state, SOURCE, "invalidate_key");
        if !matches!(*state, SlotState::Empty) {
            counter!(METRIC_INVALIDATED).increment(1);
        }
        *state = SlotState::Empty;
        true
    }

    /// True when at least one key subscribes to `event`.
    pub fn has_subscribers(&self, event: &InvalidationEvent) -> bool {
        rw_read(&self.subscriptions, SOURCE, "has_subscribers")
            .get(event)
            .is_some_and(|keys| !keys.is_empty())
    }

    /// Point-in-time view of every registered key, sorted by key.
    pub fn snapshot(&self) -> Vec<EntrySnapshot> {
        let mut events_by_key: HashMap<CacheKey, BTreeSet<String>> = HashMap::new();
        for (event, keys) in rw_read(&self.subscriptions, SOURCE, "snapshot").iter() {
            for key in keys {
                events_by_key
                    .entry(key.clone())
                    .or_default()
                    .insert(event.as_str().to_string());
            }
        }

        let mut entries: Vec<EntrySnapshot> = self
            .slots
            .iter()
            .map(|entry| {
                let state = mutex_lock(&entry.value().state, SOURCE, "snapshot").label();
                let events = events_by_key
                    .remove(entry.key())
                    .unwrap_or_default()
                    .into_iter()
                    .map(InvalidationEvent::new)
                    .collect();
                EntrySnapshot {
                    key: entry.key().clone(),
                    state,
                    events,
                }
            })
            .collect();

        entries.sort_by(|a, b| a.key.as_str().cmp(b.key.as_str()));
        entries
    }

    pub fn state_of(&self, key: &CacheKey) -> Option<EntryState> {
        self.slots
            .get(key)
            .map(|entry| mutex_lock(&entry.value().state, SOURCE, "state_of").label())
    }

    fn slot(&self, key: &CacheKey) -> Result<Arc<Slot>, CacheError> {
        self.slots
            .get(key)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| CacheError::Unregistered { key: key.clone() })
    }

    /// Store the outcome of computation `ticket` if it is still the current
    /// one. Every coalesced caller runs this; only the first transition wins.
    fn settle(
        &self,
        key: &CacheKey,
        slot: &Slot,
        ticket: u64,
        result: &Result<ErasedValue, ProducerFailure>,
    ) {
        let mut state = mutex_lock(&slot.state, SOURCE, "settle");
        let current = matches!(&*state, SlotState::Pending { ticket: pending, .. } if *pending == ticket);
        if !current {
            return;
        }

        *state = match result {
            Ok(value) => SlotState::Ready(Arc::clone(value)),
            Err(err) => {
                counter!(METRIC_PRODUCER_ERROR).increment(1);
                debug!(cache = "memo", key = %key, error = %err, "producer failed; entry left empty");
                SlotState::Empty
            }
        };
    }

    fn next_epoch(&self) -> Epoch {
        self.epochs.fetch_add(1, Ordering::SeqCst)
    }
}

fn downcast<T: Send + Sync + 'static>(key: &CacheKey, value: ErasedValue) -> Result<Arc<T>, CacheError> {
    value
        .downcast::<T>()
        .map_err(|_| CacheError::TypeMismatch { key: key.clone() })
}

/// Write-side contract: anything that changes cached data fires an event.
pub trait CacheInvalidator: Send + Sync {
    fn fire(&self, event: &InvalidationEvent) -> Invalidation;
}

impl CacheInvalidator for MemoCache {
    fn fire(&self, event: &InvalidationEvent) -> Invalidation {
        self.invalidate(event)
    }
}
