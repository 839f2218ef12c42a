//! DLQ batch retry: drives one sweep over the
//! entries [`relay_store::DeadLetterQueue::get_pending_retries`] returns.
//! Unlike the fast-path dispatch loop, each entry gets exactly one
//! delivery attempt; the DLQ itself is the outer retry loop.

use crate::context::PipelineContext;
use relay_core::RelayResult;
use uuid::Uuid;

/// Aggregate counts returned by `POST /dlq/retry`.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct DlqRetryOutcome {
    pub processed: u32,
    pub failed: u32,
    pub skipped: u32,
}

/// Pull up to `batch_size` due entries and attempt exactly one dispatch
/// each. Entries run independently; a failure in one does not affect the
/// others.
pub async fn retry_batch(ctx: &PipelineContext, batch_size: u32) -> RelayResult<DlqRetryOutcome> {
    let dlq = ctx.dlq.clone();
    let entries = tokio::task::spawn_blocking(move || dlq.get_pending_retries(batch_size))
        .await
        .map_err(|e| relay_core::RelayError::Internal(e.to_string()))??;

    let mut outcome = DlqRetryOutcome::default();
    for entry in entries {
        match retry_one(ctx, entry.id, entry.event_id).await {
            Step::Processed => outcome.processed += 1,
            Step::Failed => outcome.failed += 1,
            Step::Skipped => outcome.skipped += 1,
        }
    }
    Ok(outcome)
}

enum Step {
    Processed,
    Failed,
    Skipped,
}

async fn retry_one(ctx: &PipelineContext, dlq_id: Uuid, event_id: Uuid) -> Step {
    let dlq = ctx.dlq.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || dlq.mark_retrying(dlq_id)).await {
        tracing::warn!(dlq_id = %dlq_id, error = %e, "failed to mark dlq entry retrying");
    }

    let repo = ctx.repo.clone();
    let stored = match tokio::task::spawn_blocking(move || repo.get_by_id(event_id)).await {
        Ok(Ok(Some(stored))) => stored,
        Ok(Ok(None)) => {
            tracing::warn!(event_id = %event_id, "dlq entry references a missing event, skipping");
            return Step::Skipped;
        }
        Ok(Err(e)) => {
            tracing::warn!(event_id = %event_id, error = %e, "failed to load event for dlq retry, skipping");
            return Step::Skipped;
        }
        Err(e) => {
            tracing::warn!(event_id = %event_id, error = %e, "dlq load task panicked, skipping");
            return Step::Skipped;
        }
    };

    let repo = ctx.repo.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || repo.mark_processing(event_id)).await {
        tracing::warn!(event_id = %event_id, error = %e, "failed to mark event processing for dlq retry");
    }

    match ctx.downstream.send_once(&stored.normalized_payload).await {
        Ok(()) => {
            let repo = ctx.repo.clone();
            let dlq = ctx.dlq.clone();
            if let Err(e) = tokio::task::spawn_blocking(move || repo.mark_processed(event_id)).await {
                tracing::warn!(event_id = %event_id, error = %e, "failed to mark event processed after dlq retry");
            }
            if let Err(e) =
                tokio::task::spawn_blocking(move || dlq.mark_resolved(dlq_id, "dispatched on dlq retry")).await
            {
                tracing::warn!(dlq_id = %dlq_id, error = %e, "failed to mark dlq entry resolved");
            }
            Step::Processed
        }
        Err(dispatch_err) => {
            let dlq = ctx.dlq.clone();
            let max_retries = ctx.settings.dlq_max_retries;
            let message = dispatch_err.to_string();
            match tokio::task::spawn_blocking(move || dlq.enqueue(event_id, &message, max_retries)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::error!(event_id = %event_id, error = %e, "failed to reschedule dlq entry"),
                Err(e) => tracing::error!(event_id = %event_id, error = %e, "dlq enqueue task panicked"),
            }
            Step::Failed
        }
    }
}
