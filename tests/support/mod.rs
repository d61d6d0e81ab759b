#![allow(dead_code)]

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use http_body_util::BodyExt;
use quire::application::admin::CategoryAdminService;
use quire::application::pipeline::FreshnessPipeline;
use quire::application::repos::{
    CategoriesRepo, MediaRepo, PostProjection, PostQuery, PostsRepo, RepoError, SortOrder,
    StoreHealth, UpsertCategoryParams,
};
use quire::application::site::SiteService;
use quire::cache::{CacheConfig, MemoCache};
use quire::config::{NavMenuItem, SiteSettings};
use quire::domain::entities::{CategoryRecord, CategoryRef, MediaRecord, PostId, PostRecord};
use quire::domain::types::{PostKind, PostStatus};
use quire::infra::http::{AdminState, HttpState, build_admin_router, build_router};
use time::OffsetDateTime;
use tower::ServiceExt;
use uuid::Uuid;

/// In-memory store with call counters and switchable failures.
#[derive(Default)]
pub struct MemoryStore {
    pub posts: Mutex<Vec<PostRecord>>,
    pub categories: Mutex<Vec<CategoryRecord>>,
    pub media: Mutex<Vec<MediaRecord>>,
    pub post_queries: AtomicUsize,
    pub find_queries: AtomicUsize,
    pub category_lists: AtomicUsize,
    pub fail_posts: AtomicBool,
    pub fail_categories: AtomicBool,
    pub fail_find: AtomicBool,
}

impl MemoryStore {
    pub fn add_category(&self, slug: &str, name: &str, created: OffsetDateTime) {
        self.categories.lock().expect("lock").push(CategoryRecord {
            id: Uuid::new_v4(),
            slug: slug.to_string(),
            name: name.to_string(),
            date_created: created,
        });
    }

    pub fn add_post(&self, post: PostRecord) {
        self.posts.lock().expect("lock").push(post);
    }

    pub fn add_media(&self, url: &str, content_type: &str, modified: OffsetDateTime) {
        self.media.lock().expect("lock").push(MediaRecord {
            url: url.to_string(),
            content_type: content_type.to_string(),
            content: bytes::Bytes::from_static(b"\x89PNG"),
            date_modified: modified,
        });
    }

    pub fn post_queries(&self) -> usize {
        self.post_queries.load(Ordering::SeqCst)
    }

    pub fn find_queries(&self) -> usize {
        self.find_queries.load(Ordering::SeqCst)
    }

    pub fn category_lists(&self) -> usize {
        self.category_lists.load(Ordering::SeqCst)
    }

    fn select(&self, query: &PostQuery) -> Vec<PostRecord> {
        let mut posts: Vec<PostRecord> = self
            .posts
            .lock()
            .expect("lock")
            .iter()
            .filter(|post| query.filter.matches(post))
            .cloned()
            .collect();
        match query.sort {
            SortOrder::IdDesc => posts.sort_by(|a, b| b.id.cmp(&a.id)),
            SortOrder::IdAsc => posts.sort_by(|a, b| a.id.cmp(&b.id)),
        }
        posts
            .into_iter()
            .skip(query.skip as usize)
            .take(query.limit.map_or(usize::MAX, |limit| limit as usize))
            .map(|mut post| {
                match query.projection {
                    PostProjection::Display => {}
                    PostProjection::Summary => post.body_html = None,
                    PostProjection::Listing => {
                        post.body_html = None;
                        post.summary_html = None;
                    }
                }
                post
            })
            .collect()
    }
}

#[async_trait]
impl PostsRepo for MemoryStore {
    async fn query_posts(&self, query: &PostQuery) -> Result<Vec<PostRecord>, RepoError> {
        self.post_queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_posts.load(Ordering::SeqCst) {
            return Err(RepoError::from_persistence("posts collection unreachable"));
        }
        Ok(self.select(query))
    }

    async fn find_post(&self, query: &PostQuery) -> Result<Option<PostRecord>, RepoError> {
        self.find_queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_find.load(Ordering::SeqCst) {
            return Err(RepoError::from_persistence("neighbour lookup failed"));
        }
        Ok(self.select(&query.clone().limit(1)).into_iter().next())
    }
}

#[async_trait]
impl CategoriesRepo for MemoryStore {
    async fn list_categories_by_name(&self) -> Result<Vec<CategoryRecord>, RepoError> {
        self.category_lists.fetch_add(1, Ordering::SeqCst);
        if self.fail_categories.load(Ordering::SeqCst) {
            return Err(RepoError::Timeout);
        }
        let mut categories = self.categories.lock().expect("lock").clone();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn upsert_category(
        &self,
        params: UpsertCategoryParams,
    ) -> Result<CategoryRecord, RepoError> {
        let mut categories = self.categories.lock().expect("lock");
        if let Some(existing) = categories.iter_mut().find(|c| c.slug == params.slug) {
            existing.name = params.name;
            return Ok(existing.clone());
        }
        let record = CategoryRecord {
            id: Uuid::new_v4(),
            slug: params.slug,
            name: params.name,
            date_created: OffsetDateTime::now_utc(),
        };
        categories.push(record.clone());
        Ok(record)
    }

    async fn delete_category(&self, slug: &str) -> Result<bool, RepoError> {
        let mut categories = self.categories.lock().expect("lock");
        let before = categories.len();
        categories.retain(|category| category.slug != slug);
        Ok(categories.len() != before)
    }
}

#[async_trait]
impl MediaRepo for MemoryStore {
    async fn find_media(&self, url: &str) -> Result<Option<MediaRecord>, RepoError> {
        Ok(self
            .media
            .lock()
            .expect("lock")
            .iter()
            .find(|media| media.url == url)
            .cloned())
    }
}

#[async_trait]
impl StoreHealth for MemoryStore {
    async fn ping(&self) -> Result<(), RepoError> {
        Ok(())
    }
}

pub fn post(
    id: i64,
    slug: &str,
    categories: &[&str],
    created: OffsetDateTime,
    modified: OffsetDateTime,
) -> PostRecord {
    PostRecord {
        id: PostId(id),
        slug: slug.to_string(),
        title: format!("Post {id}"),
        status: PostStatus::Publish,
        kind: PostKind::Post,
        body_html: Some(format!("<p>Body of {slug}</p>")),
        summary_html: Some(format!("<p>Summary of {slug}</p>")),
        categories: categories
            .iter()
            .map(|slug| CategoryRef {
                slug: slug.to_string(),
                name: slug.to_uppercase(),
            })
            .collect(),
        date_created: created,
        date_modified: modified,
    }
}

pub fn site_settings() -> SiteSettings {
    SiteSettings {
        blog_name: "Quire Test".to_string(),
        public_url: url::Url::parse("https://example.com/").expect("url"),
        base_path: String::new(),
        author_display_name: "A. Writer".to_string(),
        author_email: None,
        google_analytics_id: None,
        nav_menu: vec![NavMenuItem {
            url: "/about/".to_string(),
            title: "About".to_string(),
        }],
        page_size: NonZeroU32::new(2).expect("non-zero"),
        feed_size: NonZeroU32::new(20).expect("non-zero"),
        timezone: chrono_tz::UTC,
    }
}

pub struct TestApp {
    pub public: Router,
    pub admin: Router,
    pub cache: Arc<MemoCache>,
    pub store: Arc<MemoryStore>,
}

pub fn app(store: Arc<MemoryStore>) -> TestApp {
    let cache = Arc::new(MemoCache::new(CacheConfig::default()));
    let pipeline = Arc::new(FreshnessPipeline::new(cache.clone(), store.clone()));
    let site = SiteService::new(
        pipeline,
        store.clone(),
        store.clone(),
        Arc::new(site_settings()),
    );
    let categories = Arc::new(CategoryAdminService::new(store.clone(), cache.clone()));

    TestApp {
        public: build_router(HttpState { site }),
        admin: build_admin_router(AdminState {
            cache: cache.clone(),
            categories,
            store: store.clone(),
        }),
        cache,
        store,
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.expect("router response")
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

pub fn conditional_get(uri: &str, if_none_match: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("if-none-match", if_none_match)
        .body(Body::empty())
        .expect("request")
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}
