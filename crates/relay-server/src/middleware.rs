//! Ambient HTTP middleware: CORS for the admin DLQ action and structured
//! request logging with the field-naming convention the rest of the crate
//! uses for everything touching a stored event.

use axum::{extract::Request, middleware::Next, response::Response};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Logs method, path, status, and latency for every request: the same
/// fields `process_webhook` and the dispatch loop log against a
/// `trace_id`, so a single request can be followed end to end.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    let response = next.run(request).await;

    info!(
        method = %method,
        uri = %uri,
        status = %response.status().as_u16(),
        duration_ms = %start.elapsed().as_millis(),
        "request completed"
    );

    response
}
