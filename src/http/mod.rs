//! HTTP/JSON Transport
//!
//! The request/response API over axum, mirroring the TCP surface:
//! bucket lifecycle under `/api/buckets` and key-value operations under
//! `/api/buckets/{bucket}/kv`. Every request carries a correlation id
//! (`X-Correlation-ID`), generated when the client does not supply one,
//! and JSON bodies are capped at 1 MiB.

pub mod handlers;

pub use handlers::{AppState, BUCKET_TOKEN_HEADER};

use axum::extract::{DefaultBodyLimit, Request};
use axum::http::HeaderValue;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tracing::Instrument;
use uuid::Uuid;

/// Header propagating the per-request correlation id.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Maximum accepted JSON body (1 MiB).
pub const MAX_JSON_BODY: usize = 1024 * 1024;

/// Builds the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/buckets",
            post(handlers::create_bucket).get(handlers::list_buckets),
        )
        .route(
            "/api/buckets/:bucket",
            get(handlers::get_bucket).delete(handlers::delete_bucket),
        )
        .route("/api/buckets/:bucket/kv", post(handlers::set_kv))
        .route(
            "/api/buckets/:bucket/kv/:key",
            get(handlers::get_kv).delete(handlers::delete_kv),
        )
        .layer(DefaultBodyLimit::max(MAX_JSON_BODY))
        .layer(middleware::from_fn(correlation_id))
        .with_state(state)
}

/// Takes the caller's correlation id or mints one, tags the request's
/// trace span with it, and echoes it on the response.
async fn correlation_id(request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let span = tracing::info_span!(
        "http_request",
        correlation_id = %id,
        method = %request.method(),
        uri = %request.uri()
    );

    let mut response = next.run(request).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }
    response
}
