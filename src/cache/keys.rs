//! Cache key and invalidation event names.

use std::borrow::Cow;
use std::fmt;

use serde::Serialize;

/// Name of a memoized value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CacheKey(Cow<'static, str>);

impl CacheKey {
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of a zero-payload invalidation signal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct InvalidationEvent(Cow<'static, str>);

impl InvalidationEvent {
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvalidationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// All categories sorted by name.
pub const CATEGORIES: CacheKey = CacheKey::from_static("categories");

/// Fired by any write that creates, renames or deletes a category.
pub const CATEGORIES_CHANGED: InvalidationEvent =
    InvalidationEvent::from_static("categories_changed");
