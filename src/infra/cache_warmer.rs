use std::{sync::Arc, time::Instant};

use metrics::histogram;
use thiserror::Error;
use tracing::info;

use crate::{
    application::pipeline::FreshnessPipeline, cache::CacheError,
    infra::telemetry::METRIC_CACHE_WARM_MS,
};

#[derive(Debug, Error)]
pub enum CacheWarmError {
    #[error("failed to load categories: {0}")]
    Categories(#[from] CacheError),
}

/// Fills the memoized category list before the listeners accept requests.
pub struct CacheWarmer {
    pipeline: Arc<FreshnessPipeline>,
}

impl CacheWarmer {
    pub fn new(pipeline: Arc<FreshnessPipeline>) -> Self {
        Self { pipeline }
    }

    pub async fn warm_initial(&self) -> Result<usize, CacheWarmError> {
        if !self.pipeline.cache().config().enabled {
            return Ok(0);
        }

        let started = Instant::now();
        let categories = self.pipeline.categories().await?;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        histogram!(METRIC_CACHE_WARM_MS).record(elapsed_ms);

        info!(
            categories = categories.len(),
            elapsed_ms, "Cache warmed"
        );
        Ok(categories.len())
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use time::OffsetDateTime;
    use uuid::Uuid;

    use super::*;
    use crate::application::repos::{CategoriesRepo, RepoError, UpsertCategoryParams};
    use crate::cache::{CATEGORIES, CacheConfig, EntryState, MemoCache};
    use crate::domain::entities::CategoryRecord;

    struct OneCategory;

    #[async_trait]
    impl CategoriesRepo for OneCategory {
        async fn list_categories_by_name(&self) -> Result<Vec<CategoryRecord>, RepoError> {
            Ok(vec![CategoryRecord {
                id: Uuid::new_v4(),
                slug: "tech".to_string(),
                name: "Tech".to_string(),
                date_created: OffsetDateTime::now_utc(),
            }])
        }

        async fn upsert_category(
            &self,
            _params: UpsertCategoryParams,
        ) -> Result<CategoryRecord, RepoError> {
            Err(RepoError::NotFound)
        }

        async fn delete_category(&self, _slug: &str) -> Result<bool, RepoError> {
            Ok(false)
        }
    }

    fn warmer(config: CacheConfig) -> (CacheWarmer, Arc<MemoCache>) {
        let cache = Arc::new(MemoCache::new(config));
        let pipeline = Arc::new(FreshnessPipeline::new(cache.clone(), Arc::new(OneCategory)));
        (CacheWarmer::new(pipeline), cache)
    }

    #[tokio::test]
    async fn warm_fills_category_entry() {
        let (warmer, cache) = warmer(CacheConfig::default());

        assert_eq!(warmer.warm_initial().await.expect("warm"), 1);
        assert_eq!(cache.state_of(&CATEGORIES), Some(EntryState::Ready));
    }

    #[tokio::test]
    async fn disabled_cache_skips_warm() {
        let (warmer, cache) = warmer(CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        });

        assert_eq!(warmer.warm_initial().await.expect("warm"), 0);
        assert_ne!(cache.state_of(&CATEGORIES), Some(EntryState::Ready));
    }
}
