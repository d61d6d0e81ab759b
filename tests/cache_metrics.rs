use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use quire::application::pipeline::FreshnessPipeline;
use quire::application::repos::{CategoriesRepo, RepoError, UpsertCategoryParams};
use quire::cache::{CATEGORIES_CHANGED, CacheConfig, CacheKey, InvalidationEvent, MemoCache};
use quire::domain::entities::CategoryRecord;
use quire::infra::cache_warmer::CacheWarmer;
use quire::infra::telemetry::METRIC_CACHE_WARM_MS;

#[derive(Default)]
struct CountingCategories {
    calls: AtomicUsize,
}

#[async_trait]
impl CategoriesRepo for CountingCategories {
    async fn list_categories_by_name(&self) -> Result<Vec<CategoryRecord>, RepoError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
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

#[tokio::test]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let cache = Arc::new(MemoCache::new(CacheConfig::default()));
    let pipeline = Arc::new(FreshnessPipeline::new(
        cache.clone(),
        Arc::new(CountingCategories::default()),
    ));

    // miss, then warm histogram
    CacheWarmer::new(pipeline.clone())
        .warm_initial()
        .await
        .expect("warm");
    // hit
    pipeline.categories().await.expect("categories");
    // invalidation of a ready entry
    cache.invalidate(&CATEGORIES_CHANGED);

    // producer failure
    let flaky = CacheKey::new("flaky");
    cache.register(flaky.clone(), InvalidationEvent::new("flaky_changed"));
    let failed = cache
        .get_or_compute::<u32, _, _, _>(&flaky, || async {
            Err(RepoError::from_persistence("down"))
        })
        .await;
    assert!(failed.is_err());

    let mut counters = HashMap::new();
    let mut histograms = HashMap::new();
    for (key, _, _, value) in snapshotter.snapshot().into_vec() {
        let name = key.key().name().to_string();
        match value {
            DebugValue::Counter(count) => {
                counters.insert(name, count);
            }
            DebugValue::Histogram(samples) => {
                histograms.insert(name, samples.len());
            }
            DebugValue::Gauge(_) => {}
        }
    }

    assert_eq!(counters.get("quire_memo_miss_total"), Some(&2));
    assert_eq!(counters.get("quire_memo_hit_total"), Some(&1));
    assert_eq!(counters.get("quire_memo_invalidated_total"), Some(&1));
    assert_eq!(counters.get("quire_memo_producer_error_total"), Some(&1));
    assert_eq!(histograms.get(METRIC_CACHE_WARM_MS), Some(&1));
}
