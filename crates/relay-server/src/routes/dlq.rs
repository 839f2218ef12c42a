//! `POST /dlq/retry`: drives one dead-letter-queue batch. The
//! `batch_size` query parameter is clamped to `[1, 100]`, default 10.

use crate::error::RelayApiResult;
use crate::routes::ApiResponse;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::Json;
use relay_pipeline::DlqRetryOutcome;
use serde::Deserialize;

const DEFAULT_BATCH_SIZE: u32 = 10;
const MAX_BATCH_SIZE: u32 = 100;
const MIN_BATCH_SIZE: u32 = 1;

#[derive(Debug, Deserialize)]
pub struct RetryQuery {
    batch_size: Option<u32>,
}

pub async fn retry_dlq(
    State(state): State<AppState>,
    Query(query): Query<RetryQuery>,
) -> RelayApiResult<Json<ApiResponse<DlqRetryOutcome>>> {
    let batch_size = query
        .batch_size
        .unwrap_or(DEFAULT_BATCH_SIZE)
        .clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE);

    let outcome = relay_pipeline::retry_batch(&state.ctx, batch_size).await?;
    Ok(Json(ApiResponse::ok("dlq batch retried", outcome)))
}
