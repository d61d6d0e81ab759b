use askama::Template;
use axum::{
    Router,
    extract::{Path, State},
    http::{
        HeaderMap, HeaderValue, StatusCode, Uri,
        header::{CONTENT_TYPE, ETAG, IF_NONE_MATCH, LAST_MODIFIED},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::{MethodRouter, get},
};

use crate::{
    application::{
        error::HttpError,
        freshness::Freshness,
        pipeline::ConditionalRequest,
        site::{SiteError, SiteResponse, SiteService},
    },
    domain::entities::MediaRecord,
    presentation::{
        feed::ATOM_CONTENT_TYPE,
        views::{
            ArchiveTemplate, CategoryTemplate, HomeTemplate, PostTemplate,
            render_not_found_response, render_template_response,
        },
    },
};

use super::middleware::{
    log_responses, redirect_permanent, set_request_context, slashed_location,
};

#[derive(Clone)]
pub struct HttpState {
    pub site: SiteService,
}

pub fn build_router(state: HttpState) -> Router {
    let site = state.site.clone();
    let settings = site.settings();

    let router = Router::new();
    let router = page_route(router, settings.path("/"), get(home));
    let router = page_route(router, settings.path("/page/{page}/"), get(home_page));
    let router = page_route(router, settings.path("/all-posts/"), get(all_posts));
    let router = page_route(router, settings.path("/blog/{slug}/"), get(post_detail));
    let router = page_route(router, settings.path("/category/{slug}/"), get(category));
    let router = page_route(
        router,
        settings.path("/category/{slug}/page/{page}/"),
        get(category_page),
    );
    let router = page_route(router, settings.path("/feed/"), get(site_feed));
    let router = page_route(
        router,
        settings.path("/category/{slug}/feed/"),
        get(category_feed),
    );

    router
        .route(&settings.path("/media/{*url}"), get(media))
        .fallback(fallback)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

/// Mount `handler` at `path` and redirect the same path without its trailing
/// slash. Unrouted paths are never redirected.
fn page_route(
    router: Router<HttpState>,
    path: String,
    handler: MethodRouter<HttpState>,
) -> Router<HttpState> {
    let bare = path.trim_end_matches('/');
    let router = if bare.is_empty() {
        router
    } else {
        router.route(bare, get(add_trailing_slash))
    };
    router.route(&path, handler)
}

async fn add_trailing_slash(State(state): State<HttpState>, uri: Uri) -> Response {
    match slashed_location(&uri) {
        Some(location) => redirect_permanent(location),
        None => fallback(State(state)).await,
    }
}

fn conditional_request(headers: &HeaderMap) -> ConditionalRequest {
    ConditionalRequest::new(
        headers
            .get(IF_NONE_MATCH)
            .and_then(|value| value.to_str().ok()),
    )
}

fn apply_validators(response: &mut Response, freshness: &Freshness) {
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&freshness.validator) {
        headers.insert(LAST_MODIFIED, value);
    }
    if let Ok(value) = HeaderValue::from_str(&freshness.etag()) {
        headers.insert(ETAG, value);
    }
}

/// 304 with validators, or the rendered body with validators attached.
fn respond<V>(outcome: SiteResponse<V>, render: impl FnOnce(V) -> Response) -> Response {
    match outcome {
        SiteResponse::NotModified(freshness) => {
            let mut response = StatusCode::NOT_MODIFIED.into_response();
            apply_validators(&mut response, &freshness);
            response
        }
        SiteResponse::Fresh { view, freshness } => {
            let mut response = render(view);
            if let Some(freshness) = freshness.filter(|_| response.status().is_success()) {
                apply_validators(&mut response, &freshness);
            }
            response
        }
    }
}

async fn site_error_response(state: &HttpState, err: SiteError) -> Response {
    match err {
        SiteError::NotFound { .. } => render_not_found_response(state.site.fallback_chrome().await),
        other => HttpError::from(other).into_response(),
    }
}

async fn html_response<V, T: Template>(
    state: &HttpState,
    result: Result<SiteResponse<V>, SiteError>,
    template: impl FnOnce(V) -> T,
) -> Response {
    match result {
        Ok(outcome) => respond(outcome, |view| {
            render_template_response(template(view), StatusCode::OK)
        }),
        Err(err) => site_error_response(state, err).await,
    }
}

async fn home(State(state): State<HttpState>, headers: HeaderMap) -> Response {
    let result = state.site.home(&conditional_request(&headers), 0).await;
    html_response(&state, result, |view| HomeTemplate { view }).await
}

async fn home_page(
    State(state): State<HttpState>,
    Path(page): Path<u32>,
    headers: HeaderMap,
) -> Response {
    let result = state.site.home(&conditional_request(&headers), page).await;
    html_response(&state, result, |view| HomeTemplate { view }).await
}

async fn all_posts(State(state): State<HttpState>, headers: HeaderMap) -> Response {
    let result = state.site.all_posts(&conditional_request(&headers)).await;
    html_response(&state, result, |view| ArchiveTemplate { view }).await
}

async fn post_detail(
    State(state): State<HttpState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
) -> Response {
    let result = state.site.post(&conditional_request(&headers), &slug).await;
    html_response(&state, result, |view| PostTemplate { view }).await
}

async fn category(
    State(state): State<HttpState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
) -> Response {
    let result = state
        .site
        .category(&conditional_request(&headers), &slug, 0)
        .await;
    html_response(&state, result, |view| CategoryTemplate { view }).await
}

async fn category_page(
    State(state): State<HttpState>,
    Path((slug, page)): Path<(String, u32)>,
    headers: HeaderMap,
) -> Response {
    let result = state
        .site
        .category(&conditional_request(&headers), &slug, page)
        .await;
    html_response(&state, result, |view| CategoryTemplate { view }).await
}

async fn feed_response(state: &HttpState, headers: &HeaderMap, category: Option<&str>) -> Response {
    match state
        .site
        .feed(&conditional_request(headers), category)
        .await
    {
        Ok(outcome) => respond(outcome, |document| {
            ([(CONTENT_TYPE, ATOM_CONTENT_TYPE)], document).into_response()
        }),
        Err(err) => site_error_response(state, err).await,
    }
}

async fn site_feed(State(state): State<HttpState>, headers: HeaderMap) -> Response {
    feed_response(&state, &headers, None).await
}

async fn category_feed(
    State(state): State<HttpState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
) -> Response {
    feed_response(&state, &headers, Some(slug.as_str())).await
}

async fn media(
    State(state): State<HttpState>,
    Path(url): Path<String>,
    headers: HeaderMap,
) -> Response {
    match state.site.media(&conditional_request(&headers), &url).await {
        Ok(outcome) => respond(outcome, media_response),
        Err(err) => site_error_response(&state, err).await,
    }
}

fn media_response(media: MediaRecord) -> Response {
    let content_type = HeaderValue::from_str(&media.content_type).unwrap_or_else(|_| {
        let guessed = mime_guess::from_path(&media.url).first_or_octet_stream();
        HeaderValue::from_str(guessed.as_ref())
            .unwrap_or(HeaderValue::from_static("application/octet-stream"))
    });
    ([(CONTENT_TYPE, content_type)], media.content).into_response()
}

async fn fallback(State(state): State<HttpState>) -> Response {
    render_not_found_response(state.site.fallback_chrome().await)
}
