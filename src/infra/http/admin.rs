use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use serde::Deserialize;

use crate::{
    application::{
        admin::{CategoryAdminError, CategoryAdminService},
        error::HttpError,
        repos::StoreHealth,
    },
    cache::{CacheKey, InvalidationEvent, MemoCache},
    domain::error::DomainError,
};

use super::{
    db_health_response,
    middleware::{log_responses, set_request_context},
    repo_error_to_http,
};

#[derive(Clone)]
pub struct AdminState {
    pub cache: Arc<MemoCache>,
    pub categories: Arc<CategoryAdminService>,
    pub store: Arc<dyn StoreHealth>,
}

pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/_cache", get(cache_snapshot))
        .route("/_cache/keys/{key}", delete(drop_key))
        .route("/_cache/events/{event}", post(fire_event))
        .route(
            "/categories/{slug}",
            put(upsert_category).delete(delete_category),
        )
        .route("/_health/db", get(admin_health))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn cache_snapshot(State(state): State<AdminState>) -> Response {
    Json(state.cache.snapshot()).into_response()
}

async fn fire_event(State(state): State<AdminState>, Path(event): Path<String>) -> Response {
    let event = InvalidationEvent::new(event);
    if !state.cache.has_subscribers(&event) {
        return HttpError::new(
            "infra::http::admin::fire_event",
            StatusCode::NOT_FOUND,
            "Unknown invalidation event",
            format!("no cache key subscribes to `{event}`"),
        )
        .into_response();
    }

    state.cache.invalidate(&event);
    StatusCode::NO_CONTENT.into_response()
}

async fn drop_key(State(state): State<AdminState>, Path(key): Path<String>) -> Response {
    if state.cache.invalidate_key(&CacheKey::new(key.clone())) {
        return StatusCode::NO_CONTENT.into_response();
    }
    HttpError::new(
        "infra::http::admin::drop_key",
        StatusCode::NOT_FOUND,
        "Unknown cache key",
        format!("cache key `{key}` is not registered"),
    )
    .into_response()
}

#[derive(Debug, Deserialize)]
struct CategoryBody {
    name: String,
}

async fn upsert_category(
    State(state): State<AdminState>,
    Path(slug): Path<String>,
    Json(body): Json<CategoryBody>,
) -> Response {
    match state
        .categories
        .upsert_category(&body.name, Some(slug.as_str()))
        .await
    {
        Ok(write) => Json(write.category).into_response(),
        Err(err) => category_error_response("infra::http::admin::upsert_category", err),
    }
}

async fn delete_category(State(state): State<AdminState>, Path(slug): Path<String>) -> Response {
    match state.categories.delete_category(&slug).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => category_error_response("infra::http::admin::delete_category", err),
    }
}

async fn admin_health(State(state): State<AdminState>) -> Response {
    db_health_response(state.store.ping().await)
}

fn category_error_response(source: &'static str, err: CategoryAdminError) -> Response {
    let error = match err {
        CategoryAdminError::Repo(repo) => repo_error_to_http(source, repo),
        CategoryAdminError::Domain(DomainError::NotFound { .. }) => {
            HttpError::from_error(source, StatusCode::NOT_FOUND, "Category not found", &err)
        }
        CategoryAdminError::Domain(DomainError::Validation { .. })
        | CategoryAdminError::Slug(_) => {
            HttpError::from_error(source, StatusCode::BAD_REQUEST, "Invalid category", &err)
        }
    };
    error.into_response()
}
