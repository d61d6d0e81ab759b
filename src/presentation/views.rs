use crate::application::error::{ErrorReport, HttpError};
use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn render_not_found_response(chrome: LayoutChrome) -> Response {
    let content = ErrorPageView::not_found(chrome.brand.href.clone());
    let view = LayoutContext::new(chrome, content);
    let mut response = render_template_response(ErrorTemplate { view }, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        "Resource not found",
    )
    .attach(&mut response);
    response
}

#[derive(Clone)]
pub struct BrandView {
    pub title: String,
    pub href: String,
}

#[derive(Clone)]
pub struct NavigationLinkView {
    pub label: String,
    pub href: String,
}

#[derive(Clone)]
pub struct CategoryLinkView {
    pub name: String,
    pub href: String,
    pub is_active: bool,
}

#[derive(Clone)]
pub struct PageMetaView {
    pub title: String,
    pub canonical: String,
    pub feed_href: String,
    pub feed_title: String,
}

/// Everything a page shares with every other page of the site.
#[derive(Clone)]
pub struct LayoutChrome {
    pub brand: BrandView,
    pub navigation: Vec<NavigationLinkView>,
    pub categories: Vec<CategoryLinkView>,
    pub author: String,
    pub analytics_id: Option<String>,
    pub meta: PageMetaView,
}

impl LayoutChrome {
    pub fn with_canonical(self, canonical: String) -> Self {
        Self {
            meta: PageMetaView {
                canonical,
                ..self.meta
            },
            ..self
        }
    }

    pub fn with_title(self, title: String) -> Self {
        Self {
            meta: PageMetaView { title, ..self.meta },
            ..self
        }
    }

    pub fn with_feed(self, feed_href: String, feed_title: String) -> Self {
        Self {
            meta: PageMetaView {
                feed_href,
                feed_title,
                ..self.meta
            },
            ..self
        }
    }

    pub fn with_active_category(mut self, slug_href: &str) -> Self {
        for category in &mut self.categories {
            category.is_active = category.href == slug_href;
        }
        self
    }
}

#[derive(Clone)]
pub struct LayoutContext<T> {
    pub brand: BrandView,
    pub navigation: Vec<NavigationLinkView>,
    pub categories: Vec<CategoryLinkView>,
    pub author: String,
    pub analytics_id: Option<String>,
    pub meta: PageMetaView,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(chrome: LayoutChrome, content: T) -> Self {
        Self {
            brand: chrome.brand,
            navigation: chrome.navigation,
            categories: chrome.categories,
            author: chrome.author,
            analytics_id: chrome.analytics_id,
            meta: chrome.meta,
            content,
        }
    }
}

#[derive(Clone)]
pub struct PostCard {
    pub title: String,
    pub href: String,
    pub published: String,
    pub iso_date: String,
    /// Summary projection; absent on archive listings.
    pub summary_html: Option<String>,
    pub categories: Vec<CategoryLinkView>,
}

/// Links to neighbouring listing pages.
#[derive(Clone, Default)]
pub struct PagerView {
    pub newer_href: Option<String>,
    pub older_href: Option<String>,
}

pub struct HomeContext {
    pub posts: Vec<PostCard>,
    pub pager: PagerView,
}

#[derive(Template)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub view: LayoutContext<HomeContext>,
}

pub struct ArchiveContext {
    pub posts: Vec<PostCard>,
}

#[derive(Template)]
#[template(path = "all_posts.html")]
pub struct ArchiveTemplate {
    pub view: LayoutContext<ArchiveContext>,
}

#[derive(Clone)]
pub struct AdjacentPostView {
    pub title: String,
    pub href: String,
}

pub struct PostDetailContext {
    pub title: String,
    pub published: String,
    pub iso_date: String,
    pub body_html: String,
    pub categories: Vec<CategoryLinkView>,
    pub previous: Option<AdjacentPostView>,
    pub next: Option<AdjacentPostView>,
}

#[derive(Template)]
#[template(path = "single.html")]
pub struct PostTemplate {
    pub view: LayoutContext<PostDetailContext>,
}

pub struct CategoryContext {
    pub name: String,
    pub feed_href: String,
    pub posts: Vec<PostCard>,
    pub pager: PagerView,
}

#[derive(Template)]
#[template(path = "category.html")]
pub struct CategoryTemplate {
    pub view: LayoutContext<CategoryContext>,
}

pub struct ErrorPageView {
    pub title: String,
    pub message: String,
    pub home_href: String,
}

impl ErrorPageView {
    pub fn not_found(home_href: String) -> Self {
        Self {
            title: "Page Not Found".to_string(),
            message: "The page you requested does not exist.".to_string(),
            home_href,
        }
    }
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub view: LayoutContext<ErrorPageView>,
}
