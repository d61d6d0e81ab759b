//! Public read path: one operation per site route.
//!
//! Every listing and post route goes through the freshness pipeline first,
//! so a client holding the current validator is answered before any
//! route-specific work happens.

use std::error::Error as StdError;
use std::sync::Arc;

use axum::http::StatusCode;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::debug;

use crate::application::error::HttpError;
use crate::application::freshness::{Freshness, Watermark};
use crate::application::pipeline::{
    ConditionalRequest, FetchError, Fetched, FreshnessPipeline, Outcome,
};
use crate::application::repos::{
    MediaRepo, PostProjection, PostQuery, PostsRepo, RepoError, SortOrder,
};
use crate::config::SiteSettings;
use crate::domain::entities::{CategoryRecord, CategoryRef, MediaRecord, PostRecord};
use crate::domain::slug::route_slug;
use crate::domain::types::PostKind;
use crate::presentation::feed::{AtomAuthor, AtomEntry, AtomFeed};
use crate::presentation::views::{
    AdjacentPostView, ArchiveContext, BrandView, CategoryContext, CategoryLinkView, HomeContext,
    LayoutChrome, LayoutContext, NavigationLinkView, PageMetaView, PagerView, PostCard,
    PostDetailContext,
};
use crate::util::timezone::{display_date, iso_datetime};

#[derive(Debug, Error)]
pub enum SiteError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("{entity} not found")]
    NotFound { entity: &'static str },
    /// A failure after both fetches succeeded.
    #[error("{stage} failed")]
    Downstream {
        stage: &'static str,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl SiteError {
    fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }

    fn downstream(stage: &'static str, source: RepoError) -> Self {
        Self::Downstream {
            stage,
            source: Box::new(source),
        }
    }
}

impl From<SiteError> for HttpError {
    fn from(error: SiteError) -> Self {
        const SOURCE: &str = "application::site::SiteError";
        match &error {
            SiteError::Fetch(_) => HttpError::from_error(
                SOURCE,
                StatusCode::SERVICE_UNAVAILABLE,
                "Service temporarily unavailable",
                &error,
            ),
            SiteError::NotFound { .. } => {
                HttpError::from_error(SOURCE, StatusCode::NOT_FOUND, "Resource not found", &error)
            }
            SiteError::Downstream { .. } => HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                &error,
            ),
        }
    }
}

/// Result of a read operation.
#[derive(Debug)]
pub enum SiteResponse<V> {
    NotModified(Freshness),
    Fresh {
        view: V,
        /// `None` when there was nothing to date the response by.
        freshness: Option<Freshness>,
    },
}

impl<V> SiteResponse<V> {
    pub fn freshness(&self) -> Option<&Freshness> {
        match self {
            SiteResponse::NotModified(freshness) => Some(freshness),
            SiteResponse::Fresh { freshness, .. } => freshness.as_ref(),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(V) -> U) -> SiteResponse<U> {
        match self {
            SiteResponse::NotModified(freshness) => SiteResponse::NotModified(freshness),
            SiteResponse::Fresh { view, freshness } => SiteResponse::Fresh {
                view: f(view),
                freshness,
            },
        }
    }
}

pub type Page<T> = SiteResponse<LayoutContext<T>>;

#[derive(Clone)]
pub struct SiteService {
    pipeline: Arc<FreshnessPipeline>,
    posts: Arc<dyn PostsRepo>,
    media: Arc<dyn MediaRepo>,
    settings: Arc<SiteSettings>,
}

impl SiteService {
    pub fn new(
        pipeline: Arc<FreshnessPipeline>,
        posts: Arc<dyn PostsRepo>,
        media: Arc<dyn MediaRepo>,
        settings: Arc<SiteSettings>,
    ) -> Self {
        Self {
            pipeline,
            posts,
            media,
            settings,
        }
    }

    pub fn settings(&self) -> &SiteSettings {
        &self.settings
    }

    /// Newest posts, `page_size` per page; page 0 is the front page.
    pub async fn home(
        &self,
        request: &ConditionalRequest,
        page: u32,
    ) -> Result<Page<HomeContext>, SiteError> {
        let query = self.listing_query(PostProjection::Summary, page);
        let fetched = match self.fetch(request, query).await? {
            Outcome::NotModified(freshness) => return Ok(SiteResponse::NotModified(freshness)),
            Outcome::Proceed(fetched) => fetched,
        };

        let pager = self.pager(page, fetched.content.len(), |n| {
            if n == 0 {
                self.settings.path("/")
            } else {
                self.settings.path(&format!("/page/{n}/"))
            }
        });
        let canonical = if page == 0 {
            self.settings.path("/")
        } else {
            self.settings.path(&format!("/page/{page}/"))
        };

        let chrome = self
            .chrome(&fetched.categories)
            .with_canonical(self.settings.absolute(&canonical));
        let content = HomeContext {
            posts: self.cards(&fetched.content),
            pager,
        };
        Ok(fresh(LayoutContext::new(chrome, content), fetched.freshness))
    }

    /// Every published post, newest first, without summaries.
    pub async fn all_posts(
        &self,
        request: &ConditionalRequest,
    ) -> Result<Page<ArchiveContext>, SiteError> {
        let query = PostQuery::published(PostProjection::Listing).kind(PostKind::Post);
        let fetched = match self.fetch(request, query).await? {
            Outcome::NotModified(freshness) => return Ok(SiteResponse::NotModified(freshness)),
            Outcome::Proceed(fetched) => fetched,
        };

        let chrome = self
            .chrome(&fetched.categories)
            .with_title(format!("All posts - {}", self.settings.blog_name))
            .with_canonical(self.settings.absolute(&self.settings.path("/all-posts/")));
        let content = ArchiveContext {
            posts: self.cards(&fetched.content),
        };
        Ok(fresh(LayoutContext::new(chrome, content), fetched.freshness))
    }

    /// One post or page. Posts link to their published neighbours.
    pub async fn post(
        &self,
        request: &ConditionalRequest,
        slug: &str,
    ) -> Result<Page<PostDetailContext>, SiteError> {
        let slug = route_slug(slug);
        let query = PostQuery::published(PostProjection::Display)
            .slug(slug)
            .limit(1);
        let mut fetched = match self.fetch(request, query).await? {
            Outcome::NotModified(freshness) => return Ok(SiteResponse::NotModified(freshness)),
            Outcome::Proceed(fetched) => fetched,
        };

        if fetched.content.is_empty() {
            return Err(SiteError::not_found("post"));
        }
        let post = fetched.content.swap_remove(0);

        let (previous, next) = if post.kind == PostKind::Post {
            let neighbours = PostQuery::published(PostProjection::Listing).kind(PostKind::Post);
            let previous_query = neighbours.clone().before(post.id).sort(SortOrder::IdDesc);
            let next_query = neighbours.after(post.id).sort(SortOrder::IdAsc);
            let (previous, next) = tokio::join!(
                self.posts.find_post(&previous_query),
                self.posts.find_post(&next_query)
            );
            (
                previous.map_err(|err| SiteError::downstream("previous post lookup", err))?,
                next.map_err(|err| SiteError::downstream("next post lookup", err))?,
            )
        } else {
            (None, None)
        };

        let post_path = self.post_path(&post.slug);
        let chrome = self
            .chrome(&fetched.categories)
            .with_title(format!("{} - {}", post.title, self.settings.blog_name))
            .with_canonical(self.settings.absolute(&post_path));
        let content = PostDetailContext {
            title: post.title.clone(),
            published: display_date(post.date_created, self.settings.timezone),
            iso_date: iso_datetime(post.date_created, self.settings.timezone),
            body_html: post.body_html.clone().unwrap_or_default(),
            categories: self.category_links(&post.categories),
            previous: previous.map(|neighbour| self.adjacent(&neighbour)),
            next: next.map(|neighbour| self.adjacent(&neighbour)),
        };
        Ok(fresh(LayoutContext::new(chrome, content), fetched.freshness))
    }

    /// Posts in one category, `page_size` per page.
    pub async fn category(
        &self,
        request: &ConditionalRequest,
        slug: &str,
        page: u32,
    ) -> Result<Page<CategoryContext>, SiteError> {
        let slug = route_slug(slug);
        let query = self
            .listing_query(PostProjection::Summary, page)
            .category(slug);
        let fetched = match self.fetch(request, query).await? {
            Outcome::NotModified(freshness) => return Ok(SiteResponse::NotModified(freshness)),
            Outcome::Proceed(fetched) => fetched,
        };

        let category = resolve_category(&fetched, slug)?.to_ref();
        let category_path = self.category_path(&category.slug);
        let pager = self.pager(page, fetched.content.len(), |n| {
            if n == 0 {
                category_path.clone()
            } else {
                format!("{category_path}page/{n}/")
            }
        });
        let feed_href = format!("{category_path}feed/");
        let canonical = if page == 0 {
            category_path.clone()
        } else {
            format!("{category_path}page/{page}/")
        };

        let chrome = self
            .chrome(&fetched.categories)
            .with_active_category(&category_path)
            .with_title(format!("{} - {}", category.name, self.settings.blog_name))
            .with_feed(
                feed_href.clone(),
                self.category_feed_title(&category.name),
            )
            .with_canonical(self.settings.absolute(&canonical));
        let content = CategoryContext {
            name: category.name,
            feed_href,
            posts: self.cards(&fetched.content),
            pager,
        };
        Ok(fresh(LayoutContext::new(chrome, content), fetched.freshness))
    }

    /// Atom document for the whole site or one category.
    pub async fn feed(
        &self,
        request: &ConditionalRequest,
        category: Option<&str>,
    ) -> Result<SiteResponse<String>, SiteError> {
        let category = category.map(route_slug);
        let mut query = PostQuery::published(PostProjection::Display)
            .kind(PostKind::Post)
            .limit(u64::from(self.settings.feed_size.get()));
        if let Some(slug) = category {
            query = query.category(slug);
        }
        let fetched = match self.fetch(request, query).await? {
            Outcome::NotModified(freshness) => return Ok(SiteResponse::NotModified(freshness)),
            Outcome::Proceed(fetched) => fetched,
        };

        let (title, feed_path) = match category {
            Some(slug) => {
                let category = resolve_category(&fetched, slug)?;
                (
                    self.category_feed_title(&category.name),
                    format!("{}feed/", self.category_path(&category.slug)),
                )
            }
            None => (self.settings.blog_name.clone(), self.settings.path("/feed/")),
        };

        let updated = Watermark::compute(&fetched.content, &[])
            .map(|watermark| watermark.moment())
            .unwrap_or_else(OffsetDateTime::now_utc);

        let document = AtomFeed {
            title,
            feed_url: self.settings.absolute(&feed_path),
            site_url: self.settings.absolute(&self.settings.path("/")),
            author: AtomAuthor {
                name: self.settings.author_display_name.clone(),
                email: self.settings.author_email.clone(),
            },
            updated,
            entries: fetched
                .content
                .iter()
                .map(|post| AtomEntry {
                    title: post.title.clone(),
                    url: self.settings.absolute(&self.post_path(&post.slug)),
                    content_html: post.body_html.clone().unwrap_or_default(),
                    summary_html: post.summary_html.clone(),
                    published: post.date_created,
                    updated: post.date_modified,
                })
                .collect(),
        }
        .render();

        Ok(SiteResponse::Fresh {
            view: document,
            freshness: fetched.freshness,
        })
    }

    /// Stored media object, dated by its own modification time.
    pub async fn media(
        &self,
        request: &ConditionalRequest,
        url: &str,
    ) -> Result<SiteResponse<MediaRecord>, SiteError> {
        let media = self
            .media
            .find_media(url)
            .await
            .map_err(FetchError::content)?
            .ok_or_else(|| SiteError::not_found("media"))?;

        let freshness = Freshness::new(Watermark::at(media.date_modified));
        if freshness.is_not_modified(request.if_none_match.as_deref()) {
            debug!(url, "media copy is current");
            return Ok(SiteResponse::NotModified(freshness));
        }

        Ok(SiteResponse::Fresh {
            view: media,
            freshness: Some(freshness),
        })
    }

    /// Chrome for pages rendered outside a route, such as the not-found
    /// page. Falls back to an empty category list when the store is down.
    pub async fn fallback_chrome(&self) -> LayoutChrome {
        match self.pipeline.categories().await {
            Ok(categories) => self.chrome(&categories),
            Err(err) => {
                debug!(error = %err, "rendering chrome without categories");
                self.chrome(&[])
            }
        }
    }

    async fn fetch(
        &self,
        request: &ConditionalRequest,
        query: PostQuery,
    ) -> Result<Outcome, SiteError> {
        let posts = Arc::clone(&self.posts);
        let outcome = self
            .pipeline
            .handle(request, move || async move { posts.query_posts(&query).await })
            .await?;
        Ok(outcome)
    }

    fn listing_query(&self, projection: PostProjection, page: u32) -> PostQuery {
        let page_size = u64::from(self.settings.page_size.get());
        PostQuery::published(projection)
            .kind(PostKind::Post)
            .skip(u64::from(page) * page_size)
            .limit(page_size)
    }

    fn pager(&self, page: u32, shown: usize, href: impl Fn(u32) -> String) -> PagerView {
        let full_page = shown >= self.settings.page_size.get() as usize;
        PagerView {
            newer_href: page.checked_sub(1).map(&href),
            older_href: (full_page && page < u32::MAX).then(|| href(page + 1)),
        }
    }

    fn chrome(&self, categories: &[CategoryRecord]) -> LayoutChrome {
        let settings = &self.settings;
        LayoutChrome {
            brand: BrandView {
                title: settings.blog_name.clone(),
                href: settings.path("/"),
            },
            navigation: settings
                .nav_menu
                .iter()
                .map(|item| NavigationLinkView {
                    label: item.title.clone(),
                    href: item.url.clone(),
                })
                .collect(),
            categories: categories
                .iter()
                .map(|category| CategoryLinkView {
                    name: category.name.clone(),
                    href: self.category_path(&category.slug),
                    is_active: false,
                })
                .collect(),
            author: settings.author_display_name.clone(),
            analytics_id: settings.google_analytics_id.clone(),
            meta: PageMetaView {
                title: settings.blog_name.clone(),
                canonical: settings.absolute(&settings.path("/")),
                feed_href: settings.path("/feed/"),
                feed_title: settings.blog_name.clone(),
            },
        }
    }

    fn cards(&self, posts: &[PostRecord]) -> Vec<PostCard> {
        posts
            .iter()
            .map(|post| PostCard {
                title: post.title.clone(),
                href: self.post_path(&post.slug),
                published: display_date(post.date_created, self.settings.timezone),
                iso_date: iso_datetime(post.date_created, self.settings.timezone),
                summary_html: post.summary_html.clone(),
                categories: self.category_links(&post.categories),
            })
            .collect()
    }

    fn category_links(&self, categories: &[CategoryRef]) -> Vec<CategoryLinkView> {
        categories
            .iter()
            .map(|category| CategoryLinkView {
                name: category.name.clone(),
                href: self.category_path(&category.slug),
                is_active: false,
            })
            .collect()
    }

    fn adjacent(&self, post: &PostRecord) -> AdjacentPostView {
        AdjacentPostView {
            title: post.title.clone(),
            href: self.post_path(&post.slug),
        }
    }

    fn post_path(&self, slug: &str) -> String {
        self.settings.path(&format!("/blog/{slug}/"))
    }

    fn category_path(&self, slug: &str) -> String {
        self.settings.path(&format!("/category/{slug}/"))
    }

    fn category_feed_title(&self, name: &str) -> String {
        format!("{} - Posts about {}", self.settings.blog_name, name)
    }
}

/// Look a category up in the already-fetched, possibly cached, list.
fn resolve_category<'a>(fetched: &'a Fetched, slug: &str) -> Result<&'a CategoryRecord, SiteError> {
    fetched
        .category(slug)
        .ok_or_else(|| SiteError::not_found("category"))
}

fn fresh<V>(view: V, freshness: Option<Freshness>) -> SiteResponse<V> {
    SiteResponse::Fresh { view, freshness }
}
