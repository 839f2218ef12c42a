//! Route definitions for the webhook relay's HTTP surface.

mod dlq;
mod health;
mod providers;
mod webhooks;

use crate::middleware;
use crate::state::AppState;
use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

/// Envelope shared by every success response:
/// `{success: true, message, data}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }
}

/// Build the router and attach the ambient middleware stack (logging,
/// request tracing, CORS for same-origin browser tooling against the DLQ
/// admin action).
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/providers", get(providers::list_providers))
        .route("/webhooks/:provider", post(webhooks::receive_webhook))
        .route("/dlq/retry", post(dlq::retry_dlq))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::cors_layer())
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
}
