//! `GET /providers`: registry introspection, no request
//! params, returns the full status block so operators can see which
//! providers are registered and which have a secret configured.

use crate::routes::ApiResponse;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use relay_core::RegistryStatus;

pub async fn list_providers(State(state): State<AppState>) -> Json<ApiResponse<RegistryStatus>> {
    let status = state.ctx.registry.status();
    Json(ApiResponse::ok("registry status", status))
}
