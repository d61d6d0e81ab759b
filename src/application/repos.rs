//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entities::{CategoryRecord, MediaRecord, PostId, PostRecord};
use crate::domain::types::{PostKind, PostStatus};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Which fields a post query materializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostProjection {
    /// Everything, including the rendered body.
    Display,
    /// Metadata plus the rendered summary.
    Summary,
    /// Metadata only.
    Listing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    IdDesc,
    IdAsc,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostFilter {
    pub status: Option<PostStatus>,
    pub kind: Option<PostKind>,
    pub slug: Option<String>,
    /// Posts tagged with this category slug.
    pub category: Option<String>,
    pub id_before: Option<PostId>,
    pub id_after: Option<PostId>,
}

impl PostFilter {
    pub fn matches(&self, post: &PostRecord) -> bool {
        self.status.is_none_or(|status| post.status == status)
            && self.kind.is_none_or(|kind| post.kind == kind)
            && self.slug.as_deref().is_none_or(|slug| post.slug == slug)
            && self
                .category
                .as_deref()
                .is_none_or(|category| post.in_category(category))
            && self.id_before.is_none_or(|id| post.id < id)
            && self.id_after.is_none_or(|id| post.id > id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostQuery {
    pub filter: PostFilter,
    pub projection: PostProjection,
    pub sort: SortOrder,
    pub skip: u64,
    pub limit: Option<u64>,
}

impl PostQuery {
    /// Published records of any kind, newest first.
    pub fn published(projection: PostProjection) -> Self {
        Self {
            filter: PostFilter {
                status: Some(PostStatus::Publish),
                ..PostFilter::default()
            },
            projection,
            sort: SortOrder::IdDesc,
            skip: 0,
            limit: None,
        }
    }

    pub fn kind(mut self, kind: PostKind) -> Self {
        self.filter.kind = Some(kind);
        self
    }

    pub fn slug(mut self, slug: impl Into<String>) -> Self {
        self.filter.slug = Some(slug.into());
        self
    }

    pub fn category(mut self, slug: impl Into<String>) -> Self {
        self.filter.category = Some(slug.into());
        self
    }

    pub fn before(mut self, id: PostId) -> Self {
        self.filter.id_before = Some(id);
        self
    }

    pub fn after(mut self, id: PostId) -> Self {
        self.filter.id_after = Some(id);
        self
    }

    pub fn sort(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[async_trait]
pub trait PostsRepo: Send + Sync {
    async fn query_posts(&self, query: &PostQuery) -> Result<Vec<PostRecord>, RepoError>;

    /// First record matching `query`, ignoring its limit.
    async fn find_post(&self, query: &PostQuery) -> Result<Option<PostRecord>, RepoError>;
}

#[derive(Debug, Clone)]
pub struct UpsertCategoryParams {
    pub slug: String,
    pub name: String,
}

#[async_trait]
pub trait CategoriesRepo: Send + Sync {
    async fn list_categories_by_name(&self) -> Result<Vec<CategoryRecord>, RepoError>;

    async fn upsert_category(
        &self,
        params: UpsertCategoryParams,
    ) -> Result<CategoryRecord, RepoError>;

    /// Returns false when no category had `slug`.
    async fn delete_category(&self, slug: &str) -> Result<bool, RepoError>;
}

#[async_trait]
pub trait MediaRepo: Send + Sync {
    async fn find_media(&self, url: &str) -> Result<Option<MediaRecord>, RepoError>;
}

#[async_trait]
pub trait StoreHealth: Send + Sync {
    async fn ping(&self) -> Result<(), RepoError>;
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::domain::entities::CategoryRef;

    fn post(id: i64, status: PostStatus, kind: PostKind) -> PostRecord {
        PostRecord {
            id: PostId(id),
            slug: format!("post-{id}"),
            title: format!("Post {id}"),
            status,
            kind,
            body_html: None,
            summary_html: None,
            categories: vec![CategoryRef {
                slug: "tech".to_string(),
                name: "Tech".to_string(),
            }],
            date_created: datetime!(2024-01-01 00:00 UTC),
            date_modified: datetime!(2024-01-01 00:00 UTC),
        }
    }

    #[test]
    fn published_filter_excludes_drafts() {
        let query = PostQuery::published(PostProjection::Listing);
        assert!(query.filter.matches(&post(1, PostStatus::Publish, PostKind::Post)));
        assert!(!query.filter.matches(&post(2, PostStatus::Draft, PostKind::Post)));
    }

    #[test]
    fn id_bounds_are_exclusive() {
        let query = PostQuery::published(PostProjection::Listing)
            .kind(PostKind::Post)
            .before(PostId(5));
        assert!(query.filter.matches(&post(4, PostStatus::Publish, PostKind::Post)));
        assert!(!query.filter.matches(&post(5, PostStatus::Publish, PostKind::Post)));
        assert!(!query.filter.matches(&post(4, PostStatus::Publish, PostKind::Page)));

        let after = PostQuery::published(PostProjection::Listing).after(PostId(5));
        assert!(after.filter.matches(&post(6, PostStatus::Publish, PostKind::Post)));
        assert!(!after.filter.matches(&post(5, PostStatus::Publish, PostKind::Post)));
    }

    #[test]
    fn category_filter_matches_embedded_refs() {
        let query = PostQuery::published(PostProjection::Summary).category("tech");
        assert!(query.filter.matches(&post(1, PostStatus::Publish, PostKind::Post)));
        let other = PostQuery::published(PostProjection::Summary).category("life");
        assert!(!other.filter.matches(&post(1, PostStatus::Publish, PostKind::Post)));
    }
}
