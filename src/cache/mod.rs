//! Quire cache system.
//!
//! A process-wide memoizing cache: values computed by asynchronous producers
//! are stored under a [`CacheKey`] and dropped when an
//! [`InvalidationEvent`] the key subscribes to fires.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! warm_on_startup = true
//! ```

mod config;
mod events;
mod keys;
mod lock;
mod memo;

pub use config::CacheConfig;
pub use events::{Epoch, Invalidation};
pub use keys::{CATEGORIES, CATEGORIES_CHANGED, CacheKey, InvalidationEvent};
pub use memo::{
    CacheError, CacheInvalidator, EntrySnapshot, EntryState, MemoCache, ProducerFailure,
};

pub(crate) use memo::{
    METRIC_COALESCED, METRIC_HIT, METRIC_INVALIDATED, METRIC_MISS, METRIC_PRODUCER_ERROR,
};
