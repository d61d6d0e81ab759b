//! Conditional-response pipeline shared by every listing and post route.
//!
//! The category list (memoized) and the route's content (queried directly)
//! are fetched concurrently. Their combined watermark decides whether the
//! client's copy is still current before any rendering happens.

use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::application::freshness::{Freshness, Watermark};
use crate::application::repos::{CategoriesRepo, RepoError};
use crate::cache::{CATEGORIES, CATEGORIES_CHANGED, CacheError, MemoCache};
use crate::domain::entities::{CategoryRecord, PostRecord};

/// Which of the two concurrent fetches failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSide {
    Categories,
    Content,
}

impl fmt::Display for FetchSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchSide::Categories => f.write_str("categories"),
            FetchSide::Content => f.write_str("content"),
        }
    }
}

/// A fetch failed before any freshness decision was made.
#[derive(Debug, Error)]
#[error("failed to fetch {side}")]
pub struct FetchError {
    pub side: FetchSide,
    #[source]
    pub source: Box<dyn StdError + Send + Sync>,
}

impl FetchError {
    pub fn categories(source: CacheError) -> Self {
        Self {
            side: FetchSide::Categories,
            source: Box::new(source),
        }
    }

    pub fn content(source: RepoError) -> Self {
        Self {
            side: FetchSide::Content,
            source: Box::new(source),
        }
    }
}

/// Request data the pipeline needs: the client's validator, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionalRequest {
    pub if_none_match: Option<String>,
}

impl ConditionalRequest {
    pub fn new(if_none_match: Option<impl Into<String>>) -> Self {
        Self {
            if_none_match: if_none_match.map(Into::into),
        }
    }
}

/// Records gathered for a request that must be answered in full.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub content: Vec<PostRecord>,
    pub categories: Arc<Vec<CategoryRecord>>,
    /// `None` when both record sets were empty.
    pub freshness: Option<Freshness>,
}

impl Fetched {
    pub fn category(&self, slug: &str) -> Option<&CategoryRecord> {
        self.categories.iter().find(|category| category.slug == slug)
    }
}

#[derive(Debug, Clone)]
pub enum Outcome {
    /// The client already holds the current representation.
    NotModified(Freshness),
    Proceed(Fetched),
}

pub struct FreshnessPipeline {
    cache: Arc<MemoCache>,
    categories: Arc<dyn CategoriesRepo>,
}

impl FreshnessPipeline {
    /// Registers the category list under `categories_changed`.
    pub fn new(cache: Arc<MemoCache>, categories: Arc<dyn CategoriesRepo>) -> Self {
        cache.register(CATEGORIES, CATEGORIES_CHANGED);
        Self { cache, categories }
    }

    pub fn cache(&self) -> &Arc<MemoCache> {
        &self.cache
    }

    /// All categories sorted by name, through the memoizing cache.
    pub async fn categories(&self) -> Result<Arc<Vec<CategoryRecord>>, CacheError> {
        let repo = Arc::clone(&self.categories);
        self.cache
            .get_or_compute(&CATEGORIES, move || async move {
                repo.list_categories_by_name().await
            })
            .await
    }

    pub async fn handle<F, Fut>(
        &self,
        request: &ConditionalRequest,
        fetch_content: F,
    ) -> Result<Outcome, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<PostRecord>, RepoError>>,
    {
        let (categories, content) = tokio::join!(self.categories(), fetch_content());
        let categories = categories.map_err(FetchError::categories)?;
        let content = content.map_err(FetchError::content)?;

        let Some(watermark) = Watermark::compute(&content, &categories) else {
            debug!("no records to date; skipping conditional check");
            return Ok(Outcome::Proceed(Fetched {
                content,
                categories,
                freshness: None,
            }));
        };

        let freshness = Freshness::new(watermark);
        if freshness.is_not_modified(request.if_none_match.as_deref()) {
            debug!(validator = %freshness.validator, "client copy is current");
            return Ok(Outcome::NotModified(freshness));
        }

        Ok(Outcome::Proceed(Fetched {
            content,
            categories,
            freshness: Some(freshness),
        }))
    }
}
