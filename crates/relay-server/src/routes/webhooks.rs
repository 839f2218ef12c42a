//! `POST /webhooks/:provider`: the inbound webhook surface. The
//! handler owns nothing beyond reading the body once and handing off to
//! `relay_pipeline::process_webhook`. All provider-specific logic and the
//! fast-path/slow-path split live below this layer.

use crate::error::RelayApiResult;
use crate::routes::ApiResponse;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use relay_pipeline::IngestAccepted;

/// `POST /webhooks/{provider}`. Body is read exactly once via the `Bytes`
/// extractor; everything else is delegated.
pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> RelayApiResult<Json<ApiResponse<IngestAccepted>>> {
    let accepted = relay_pipeline::process_webhook(&state.ctx, &provider, &headers, &body).await?;
    Ok(Json(ApiResponse::ok("webhook accepted", accepted)))
}
