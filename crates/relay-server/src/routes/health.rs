//! `GET /health` (ambient): not one of the documented inbound webhook
//! routes, but every long-running service in this stack carries one,
//! wired the same way as its own health route, reporting
//! registry and DLQ stats instead of a bare 200.

use crate::error::RelayApiResult;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: i64,
    pub providers: relay_core::RegistryStatus,
    pub dlq: relay_store::DlqStats,
}

pub async fn health_check(State(state): State<AppState>) -> RelayApiResult<Json<HealthResponse>> {
    let dlq = state.ctx.dlq.clone();
    let dlq_stats = tokio::task::spawn_blocking(move || dlq.stats())
        .await
        .map_err(|e| relay_core::RelayError::Internal(e.to_string()))??;

    Ok(Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: (chrono::Utc::now() - state.started_at).num_seconds(),
        providers: state.ctx.registry.status(),
        dlq: dlq_stats,
    }))
}
