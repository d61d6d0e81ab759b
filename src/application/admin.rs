//! Category write path.
//!
//! Writes go to the store first; the `categories_changed` event fires only
//! after the store accepted the change.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::application::repos::{CategoriesRepo, RepoError, UpsertCategoryParams};
use crate::cache::{CATEGORIES_CHANGED, CacheInvalidator, Invalidation};
use crate::domain::entities::CategoryRecord;
use crate::domain::error::DomainError;
use crate::domain::slug::{SlugError, derive_slug, route_slug};

#[derive(Debug, Error)]
pub enum CategoryAdminError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct CategoryWrite {
    pub category: CategoryRecord,
    pub invalidation: Invalidation,
}

pub struct CategoryAdminService {
    categories: Arc<dyn CategoriesRepo>,
    invalidator: Arc<dyn CacheInvalidator>,
}

impl CategoryAdminService {
    pub fn new(categories: Arc<dyn CategoriesRepo>, invalidator: Arc<dyn CacheInvalidator>) -> Self {
        Self {
            categories,
            invalidator,
        }
    }

    /// Create or rename a category. The slug is derived from `name` when
    /// not given.
    pub async fn upsert_category(
        &self,
        name: &str,
        slug: Option<&str>,
    ) -> Result<CategoryWrite, CategoryAdminError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("name", "category name must not be empty").into());
        }

        let slug = match slug.map(route_slug).map(str::trim) {
            Some(given) if !given.is_empty() => derive_slug(given)?,
            _ => derive_slug(name)?,
        };

        let category = self
            .categories
            .upsert_category(UpsertCategoryParams {
                slug,
                name: name.to_string(),
            })
            .await?;
        let invalidation = self.invalidator.fire(&CATEGORIES_CHANGED);

        info!(
            slug = %category.slug,
            event_id = %invalidation.id,
            "Category saved"
        );
        Ok(CategoryWrite {
            category,
            invalidation,
        })
    }

    pub async fn delete_category(&self, slug: &str) -> Result<Invalidation, CategoryAdminError> {
        let slug = route_slug(slug);
        if !self.categories.delete_category(slug).await? {
            return Err(DomainError::not_found("category").into());
        }
        let invalidation = self.invalidator.fire(&CATEGORIES_CHANGED);

        info!(
            slug,
            event_id = %invalidation.id,
            "Category deleted"
        );
        Ok(invalidation)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use time::OffsetDateTime;
    use uuid::Uuid;

    use super::*;
    use crate::cache::{CacheConfig, InvalidationEvent, MemoCache};

    #[derive(Default)]
    struct RecordingRepo {
        saved: Mutex<Vec<UpsertCategoryParams>>,
    }

    #[async_trait]
    impl CategoriesRepo for RecordingRepo {
        async fn list_categories_by_name(&self) -> Result<Vec<CategoryRecord>, RepoError> {
            Ok(Vec::new())
        }

        async fn upsert_category(
            &self,
            params: UpsertCategoryParams,
        ) -> Result<CategoryRecord, RepoError> {
            self.saved.lock().expect("lock").push(params.clone());
            Ok(CategoryRecord {
                id: Uuid::new_v4(),
                slug: params.slug,
                name: params.name,
                date_created: OffsetDateTime::now_utc(),
            })
        }

        async fn delete_category(&self, slug: &str) -> Result<bool, RepoError> {
            Ok(slug == "tech")
        }
    }

    struct RecordingInvalidator {
        cache: MemoCache,
        fired: Mutex<Vec<InvalidationEvent>>,
    }

    impl CacheInvalidator for RecordingInvalidator {
        fn fire(&self, event: &InvalidationEvent) -> Invalidation {
            self.fired.lock().expect("lock").push(event.clone());
            self.cache.invalidate(event)
        }
    }

    fn service() -> (CategoryAdminService, Arc<RecordingRepo>, Arc<RecordingInvalidator>) {
        let repo = Arc::new(RecordingRepo::default());
        let invalidator = Arc::new(RecordingInvalidator {
            cache: MemoCache::new(CacheConfig::default()),
            fired: Mutex::new(Vec::new()),
        });
        let service = CategoryAdminService::new(repo.clone(), invalidator.clone());
        (service, repo, invalidator)
    }

    #[tokio::test]
    async fn upsert_derives_slug_and_fires_event() {
        let (service, repo, invalidator) = service();

        let write = service
            .upsert_category("Rust & Tokio", None)
            .await
            .expect("saved");

        assert_eq!(write.category.slug, "rust-tokio");
        assert_eq!(repo.saved.lock().expect("lock").len(), 1);
        assert_eq!(
            invalidator.fired.lock().expect("lock").as_slice(),
            &[CATEGORIES_CHANGED]
        );
    }

    #[tokio::test]
    async fn explicit_slug_is_normalized() {
        let (service, _, _) = service();
        let write = service
            .upsert_category("Tech", Some("Tech News/"))
            .await
            .expect("saved");
        assert_eq!(write.category.slug, "tech-news");
    }

    #[tokio::test]
    async fn blank_name_is_rejected_without_event() {
        let (service, repo, invalidator) = service();

        let err = service
            .upsert_category("  ", None)
            .await
            .expect_err("blank name");

        assert!(matches!(err, CategoryAdminError::Domain(DomainError::Validation { .. })));
        assert!(repo.saved.lock().expect("lock").is_empty());
        assert!(invalidator.fired.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn deleting_unknown_category_fires_nothing() {
        let (service, _, invalidator) = service();

        let err = service.delete_category("life").await.expect_err("missing");
        assert!(matches!(err, CategoryAdminError::Domain(DomainError::NotFound { .. })));
        assert!(invalidator.fired.lock().expect("lock").is_empty());

        service.delete_category("tech/").await.expect("deleted");
        assert_eq!(invalidator.fired.lock().expect("lock").len(), 1);
    }

    #[test]
    fn memo_cache_serves_as_invalidator() {
        let cache: Arc<dyn CacheInvalidator> = Arc::new(MemoCache::new(CacheConfig::default()));
        let record = cache.fire(&CATEGORIES_CHANGED);
        assert_eq!(record.keys_invalidated, 0);
        assert_eq!(record.event, CATEGORIES_CHANGED);
    }
}
