mod support;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use quire::cache::{CATEGORIES, EntryState};
use support::{MemoryStore, app, body_text, get, post, send};
use time::macros::datetime;

fn seeded() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::default());
    store.add_category("tech", "Tech", datetime!(2024-01-01 10:00 UTC));
    store.add_post(post(
        1,
        "post-1",
        &["tech"],
        datetime!(2024-02-01 10:00 UTC),
        datetime!(2024-02-01 10:00 UTC),
    ));
    store
}

fn request(method: Method, uri: &str, body: Option<&str>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request")
}

#[tokio::test]
async fn firing_an_event_forces_recompute() {
    let app = app(seeded());

    send(&app.public, get("/")).await;
    send(&app.public, get("/")).await;
    assert_eq!(app.store.category_lists(), 1);

    let fired = send(
        &app.admin,
        request(Method::POST, "/_cache/events/categories_changed", None),
    )
    .await;
    assert_eq!(fired.status(), StatusCode::NO_CONTENT);
    assert_eq!(app.cache.state_of(&CATEGORIES), Some(EntryState::Empty));

    send(&app.public, get("/")).await;
    assert_eq!(app.store.category_lists(), 2);
}

#[tokio::test]
async fn unknown_event_is_not_found() {
    let app = app(seeded());

    let response = send(
        &app.admin,
        request(Method::POST, "/_cache/events/nobody_listens", None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn renaming_a_category_reaches_the_next_page() {
    let app = app(seeded());

    let before = body_text(send(&app.public, get("/")).await).await;
    assert!(before.contains(">Tech</a>"));

    let saved = send(
        &app.admin,
        request(
            Method::PUT,
            "/categories/tech",
            Some(r#"{"name": "Technology"}"#),
        ),
    )
    .await;
    assert_eq!(saved.status(), StatusCode::OK);
    let json: serde_json::Value =
        serde_json::from_str(&body_text(saved).await).expect("json body");
    assert_eq!(json["slug"], "tech");
    assert_eq!(json["name"], "Technology");

    let after = body_text(send(&app.public, get("/")).await).await;
    assert!(after.contains(">Technology</a>"));
}

#[tokio::test]
async fn category_writes_validate_input() {
    let app = app(seeded());

    let blank = send(
        &app.admin,
        request(Method::PUT, "/categories/tech", Some(r#"{"name": "  "}"#)),
    )
    .await;
    assert_eq!(blank.status(), StatusCode::BAD_REQUEST);

    let missing = send(&app.admin, request(Method::DELETE, "/categories/life", None)).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let deleted = send(&app.admin, request(Method::DELETE, "/categories/tech", None)).await;
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

    let gone = send(&app.public, get("/category/tech/")).await;
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn snapshot_reports_entries_and_health() {
    let app = app(seeded());
    send(&app.public, get("/")).await;

    let response = send(&app.admin, get("/_cache")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value =
        serde_json::from_str(&body_text(response).await).expect("json body");
    assert_eq!(json[0]["key"], "categories");
    assert_eq!(json[0]["state"], "ready");
    assert_eq!(json[0]["events"][0], "categories_changed");

    let health = send(&app.admin, get("/_health/db")).await;
    assert_eq!(health.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn dropping_a_single_key() {
    let app = app(seeded());
    send(&app.public, get("/")).await;

    let dropped = send(
        &app.admin,
        request(Method::DELETE, "/_cache/keys/categories", None),
    )
    .await;
    assert_eq!(dropped.status(), StatusCode::NO_CONTENT);
    assert_eq!(app.cache.state_of(&CATEGORIES), Some(EntryState::Empty));

    let unknown = send(
        &app.admin,
        request(Method::DELETE, "/_cache/keys/nothing", None),
    )
    .await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}
