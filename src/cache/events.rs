//! Invalidation records.
//!
//! Every call to `MemoCache::invalidate` produces one record. Records are
//! logged and returned to the caller; nothing is queued, since all
//! subscribed entries are already invalid when the call returns.

use serde::Serialize;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use super::keys::InvalidationEvent;

/// Monotonic counter of invalidations fired by one cache instance.
pub type Epoch = u64;

/// Outcome of firing one invalidation event.
#[derive(Debug, Clone, Serialize)]
pub struct Invalidation {
    /// Unique identifier for log correlation.
    pub id: Uuid,
    pub epoch: Epoch,
    pub event: InvalidationEvent,
    /// Number of subscribed keys that were marked for recompute.
    pub keys_invalidated: usize,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl Invalidation {
    pub(crate) fn new(event: InvalidationEvent, epoch: Epoch, keys_invalidated: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            epoch,
            event,
            keys_invalidated,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    pub(crate) fn log(&self) {
        info!(
            event_id = %self.id,
            event_epoch = self.epoch,
            event = %self.event,
            keys_invalidated = self.keys_invalidated,
            "Cache invalidation event fired"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalidation_records_are_unique() {
        let event = InvalidationEvent::new("categories_changed");
        let first = Invalidation::new(event.clone(), 0, 1);
        let second = Invalidation::new(event, 1, 1);

        assert_ne!(first.id, second.id);
        assert!(first.epoch < second.epoch);
    }

    #[test]
    fn invalidation_serializes_event_name() {
        let record = Invalidation::new(InvalidationEvent::new("x"), 3, 0);
        let json = serde_json::to_value(&record).expect("serialize");
        assert_eq!(json["event"], "x");
        assert_eq!(json["epoch"], 3);
        assert_eq!(json["keys_invalidated"], 0);
    }
}
