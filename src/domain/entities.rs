//! Domain entities mirrored from persistent storage.
//!
//! Records are immutable snapshots: they are fetched per request and dropped
//! once the response completes. Only the category list outlives a request,
//! inside the memoizing cache.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::types::{PostKind, PostStatus};

/// Ordered post identifier. Identifiers grow over time, so `id` order is
/// publication order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub i64);

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Category reference embedded in a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRef {
    pub slug: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostRecord {
    pub id: PostId,
    pub slug: String,
    pub title: String,
    pub status: PostStatus,
    pub kind: PostKind,
    /// Present only when the query asked for the display projection.
    pub body_html: Option<String>,
    /// Present only when the query asked for the summary projection.
    pub summary_html: Option<String>,
    pub categories: Vec<CategoryRef>,
    pub date_created: OffsetDateTime,
    pub date_modified: OffsetDateTime,
}

impl PostRecord {
    /// Latest of creation and modification time.
    pub fn last_touched(&self) -> OffsetDateTime {
        self.date_created.max(self.date_modified)
    }

    pub fn in_category(&self, slug: &str) -> bool {
        self.categories.iter().any(|category| category.slug == slug)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryRecord {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub date_created: OffsetDateTime,
}

impl CategoryRecord {
    pub fn to_ref(&self) -> CategoryRef {
        CategoryRef {
            slug: self.slug.clone(),
            name: self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaRecord {
    pub url: String,
    pub content_type: String,
    pub content: Bytes,
    pub date_modified: OffsetDateTime,
}
