//! Request logging middleware.
//!
//! One line per request with method, path, status and latency. Headers are
//! never logged since they carry bearers and session cookies.

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Log an HTTP exchange. 5xx at WARN, auth rejections (401/403) at DEBUG since
/// stale bearers are routine, everything else at INFO.
pub async fn request_logging(request: Request<Body>, next: Next) -> Response {
    let path = request.uri().path().to_owned();
    if path == "/health" {
        return next.run(request).await;
    }
    let method = request.method().clone();

    let started = Instant::now();
    let response = next.run(request).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;
    let status = response.status();

    match status.as_u16() {
        500.. => warn!(%method, %path, status = status.as_u16(), elapsed_ms, "⚠️ Request failed"),
        401 | 403 => debug!(%method, %path, status = status.as_u16(), elapsed_ms, "Request rejected"),
        _ => info!(%method, %path, status = status.as_u16(), elapsed_ms, "Request served"),
    }

    response
}
