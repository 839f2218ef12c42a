//! Dispatcher slow path: per-event retry loop, DLQ hand-off on
//! exhaustion. Driven entirely by independent background tasks, one per
//! event, no shared mutable state between them.

use crate::context::PipelineContext;
use backon::{ExponentialBuilder, Retryable};
use relay_core::CanonicalEvent;
use relay_dispatch::DispatchError;
use std::time::Duration;
use uuid::Uuid;

/// `event_id` is `None` in degraded mode: the event was never
/// persisted, so there is no row to transition and no DLQ entry to create
/// on failure; only the delivery attempt itself still happens.
pub async fn run(ctx: PipelineContext, event_id: Option<Uuid>, event: CanonicalEvent) {
    if let Some(id) = event_id {
        if let Err(e) = mark_processing(&ctx, id).await {
            tracing::warn!(event_id = %id, error = %e, "failed to mark event processing");
        }
    }

    let settings = &ctx.settings;
    // `with_max_times(n)` yields 1 initial call + n retries = RETRY_MAX_ATTEMPTS total.
    let policy = ExponentialBuilder::default()
        .with_max_times(settings.retry_max_attempts.saturating_sub(1) as usize)
        .with_min_delay(Duration::from_secs(settings.retry_initial_delay_seconds))
        .with_max_delay(Duration::from_secs(settings.retry_max_delay_seconds))
        .with_factor(2.0);

    let downstream = ctx.downstream.clone();
    let attempt = || {
        let downstream = downstream.clone();
        let event = event.clone();
        async move { downstream.send_once(&event).await }
    };

    let trace_id = event_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "degraded".to_string());

    let result = attempt
        .retry(policy)
        .when(DispatchError::is_transient)
        .notify(|err: &DispatchError, dur: Duration| {
            tracing::warn!(trace_id = %trace_id, error = %err, delay = ?dur, "dispatch attempt failed, retrying");
        })
        .await;

    match result {
        Ok(()) => {
            if let Some(id) = event_id {
                if let Err(e) = mark_processed(&ctx, id).await {
                    tracing::warn!(event_id = %id, error = %e, "failed to mark event processed");
                }
            }
            tracing::info!(trace_id = %trace_id, "event dispatched successfully");
        }
        Err(last_error) => {
            tracing::error!(trace_id = %trace_id, error = %last_error, "event dispatch exhausted retries");
            let Some(id) = event_id else {
                // Degraded mode: nothing persisted, nothing to fail or enqueue.
                return;
            };
            if let Err(e) = mark_failed(&ctx, id, &last_error.to_string()).await {
                tracing::warn!(event_id = %id, error = %e, "failed to mark event failed");
            }
            if settings.dlq_enabled {
                let dlq = ctx.dlq.clone();
                let max_retries = settings.dlq_max_retries;
                let message = last_error.to_string();
                let enqueue_result = tokio::task::spawn_blocking(move || {
                    dlq.enqueue(id, &message, max_retries)
                })
                .await;
                match enqueue_result {
                    Ok(Ok(_)) => tracing::info!(event_id = %id, "event enqueued to dead letter queue"),
                    Ok(Err(e)) => tracing::error!(event_id = %id, error = %e, "failed to enqueue to dead letter queue"),
                    Err(e) => tracing::error!(event_id = %id, error = %e, "dlq enqueue task panicked"),
                }
            }
        }
    }
}

async fn mark_processing(ctx: &PipelineContext, id: Uuid) -> Result<(), relay_core::RelayError> {
    let repo = ctx.repo.clone();
    tokio::task::spawn_blocking(move || repo.mark_processing(id))
        .await
        .map_err(|e| relay_core::RelayError::Internal(e.to_string()))?
}

async fn mark_processed(ctx: &PipelineContext, id: Uuid) -> Result<(), relay_core::RelayError> {
    let repo = ctx.repo.clone();
    tokio::task::spawn_blocking(move || repo.mark_processed(id))
        .await
        .map_err(|e| relay_core::RelayError::Internal(e.to_string()))?
}

async fn mark_failed(
    ctx: &PipelineContext,
    id: Uuid,
    message: &str,
) -> Result<(), relay_core::RelayError> {
    let repo = ctx.repo.clone();
    let message = message.to_string();
    tokio::task::spawn_blocking(move || repo.mark_failed(id, &message))
        .await
        .map_err(|e| relay_core::RelayError::Internal(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{ProviderRegistry, RelaySettings, SecretSource};
    use relay_store::{DeadLetterQueue, EventRepository, EventStatus};
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct NoSecrets;
    impl SecretSource for NoSecrets {
        fn secret_for(&self, _: &str) -> Option<String> {
            None
        }
    }

    fn test_ctx(base_url: String) -> PipelineContext {
        let mut settings = RelaySettings::for_tests();
        settings.journey_service_url = base_url;
        settings.retry_max_attempts = 3;
        settings.retry_initial_delay_seconds = 0;
        let registry = Arc::new(ProviderRegistry::with_defaults(&NoSecrets));
        let repo = EventRepository::in_memory().unwrap();
        let dlq = DeadLetterQueue::in_memory().unwrap();
        PipelineContext::new(registry, repo, dlq, Arc::new(settings))
    }

    #[tokio::test]
    async fn retry_then_success_marks_event_processed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/tracking/external-event"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/tracking/external-event"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let ctx = test_ctx(server.uri());
        let (raw, normalized) = (
            serde_json::json!({}),
            CanonicalEvent::new("form", "form_submission").with_external_id(Some("e-1".into())),
        );
        let stored = ctx
            .repo
            .create_event("form", "form_submission", raw, normalized.clone(), Some("e-1"), None, None)
            .unwrap();

        run(ctx.clone(), Some(stored.id), normalized).await;

        let reloaded = ctx.repo.get_by_id(stored.id).unwrap().unwrap();
        assert_eq!(reloaded.status, EventStatus::Processed);
        assert!(ctx.dlq.get_by_event_id(stored.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn exhaustion_marks_failed_and_enqueues_dlq() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/tracking/external-event"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let ctx = test_ctx(server.uri());
        let (raw, normalized) = (
            serde_json::json!({}),
            CanonicalEvent::new("form", "form_submission").with_external_id(Some("e-2".into())),
        );
        let stored = ctx
            .repo
            .create_event("form", "form_submission", raw, normalized.clone(), Some("e-2"), None, None)
            .unwrap();

        run(ctx.clone(), Some(stored.id), normalized).await;

        let reloaded = ctx.repo.get_by_id(stored.id).unwrap().unwrap();
        assert_eq!(reloaded.status, EventStatus::Failed);
        let dlq_entry = ctx.dlq.get_by_event_id(stored.id).unwrap().unwrap();
        assert_eq!(dlq_entry.retry_count, 0);
    }

    #[tokio::test]
    async fn degraded_mode_never_touches_repo_or_dlq() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/tracking/external-event"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let ctx = test_ctx(server.uri());
        let normalized = CanonicalEvent::new("form", "form_submission");
        run(ctx.clone(), None, normalized).await;
        assert_eq!(ctx.dlq.stats().unwrap().total, 0);
    }
}
