use std::time::Instant;

use axum::{
    body::Body,
    http::{Request, StatusCode, Uri, header::LOCATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let ctx = RequestContext {
        request_id: request_id.clone(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(ctx);
    response
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        let elapsed_ms = start.elapsed().as_millis();
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());

        if status.is_server_error() {
            error!(
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                "request failed",
            );
        } else {
            warn!(
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                "client request error",
            );
        }
    }

    response
}

/// `Location` for the slashed form of `uri`, or `None` when the path must not
/// be redirected.
///
/// A path starting with `//`, or containing a backslash, would make the
/// target an off-site protocol-relative URL in browsers.
pub fn slashed_location(uri: &Uri) -> Option<String> {
    let path = uri.path();
    if path.ends_with('/') || path.starts_with("//") || path.contains('\\') {
        return None;
    }
    Some(match uri.query() {
        Some(query) => format!("{path}/?{query}"),
        None => format!("{path}/"),
    })
}

pub fn redirect_permanent(location: String) -> Response {
    (StatusCode::MOVED_PERMANENTLY, [(LOCATION, location)]).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(uri: &'static str) -> Option<String> {
        slashed_location(&Uri::from_static(uri))
    }

    #[test]
    fn slash_is_appended_before_the_query() {
        assert_eq!(location("/all-posts").as_deref(), Some("/all-posts/"));
        assert_eq!(
            location("/blog/post-1?ref=feed").as_deref(),
            Some("/blog/post-1/?ref=feed")
        );
        assert_eq!(location("/all-posts/"), None);
    }

    #[test]
    fn protocol_relative_targets_are_refused() {
        assert_eq!(location("//evil.example"), None);
        assert_eq!(location("//evil.example/path"), None);
        assert_eq!(location("/\\evil.example"), None);
    }
}
