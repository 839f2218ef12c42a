//! Ingestion pipeline: the synchronous fast path that verifies,
//! parses, normalizes, and persists a webhook, then hands off to the
//! background dispatcher.

use crate::context::PipelineContext;
use crate::dispatch_loop;
use relay_core::{CanonicalEvent, RelayError, RelayResult};
use serde_json::Value;
use uuid::Uuid;

/// Returned to the HTTP surface on acceptance.
#[derive(Debug, Clone, serde::Serialize)]
pub struct IngestAccepted {
    pub trace_id: String,
    pub provider: String,
    pub event_type: String,
}

/// `body` has already been read exactly once by the
/// caller. Errors here are only authentication, configuration, and
/// malformed-input failures; anything else degrades rather than
/// propagating.
pub async fn process_webhook(
    ctx: &PipelineContext,
    provider_name: &str,
    headers: &http::HeaderMap,
    body: &[u8],
) -> RelayResult<IngestAccepted> {
    let provider = ctx.registry.get(provider_name).ok_or_else(|| {
        RelayError::ProviderNotFound(format!(
            "{provider_name} (available: {})",
            ctx.registry.list_names().join(", ")
        ))
    })?;

    // "provider has no configured secret" is checked before verify.
    let secret = ctx
        .registry
        .secret_for(provider_name)
        .ok_or_else(|| RelayError::ProviderNotConfigured(provider_name.to_string()))?;

    if !provider.verify(headers, body, secret) {
        return Err(RelayError::Authentication(format!(
            "signature check failed for provider {provider_name}"
        )));
    }

    let raw: Value = provider.parse(body)?;
    let normalized: CanonicalEvent = provider.normalize(&raw);

    let (trace_id, event_id) = persist_or_degrade(ctx, &raw, &normalized).await;

    let ctx = ctx.clone();
    let dispatch_event = normalized.clone();
    tokio::spawn(dispatch_loop::run(ctx, event_id, dispatch_event));

    Ok(IngestAccepted {
        trace_id,
        provider: normalized.source.clone(),
        event_type: normalized.event_type.clone(),
    })
}

/// Persists the event, with a degraded-mode fallback: if persistence fails for
/// transient reasons, synthesize a trace id and keep going rather than
/// fail the caller's HTTP response.
async fn persist_or_degrade(
    ctx: &PipelineContext,
    raw: &Value,
    normalized: &CanonicalEvent,
) -> (String, Option<Uuid>) {
    let repo = ctx.repo.clone();
    let raw = raw.clone();
    let normalized_clone = normalized.clone();
    let provider = normalized.source.clone();
    let event_type = normalized.event_type.clone();
    let external_id = normalized.external_id.clone();
    let user_identifier = normalized.user_identifier.clone();
    let organization_id = normalized.organization_id.clone();

    let result = tokio::task::spawn_blocking(move || {
        repo.create_event(
            &provider,
            &event_type,
            raw,
            normalized_clone,
            external_id.as_deref(),
            user_identifier.as_deref(),
            organization_id.as_deref(),
        )
    })
    .await;

    match result {
        Ok(Ok(stored)) => {
            tracing::info!(event_id = %stored.id, provider = %stored.provider, "persisted event");
            (stored.id.to_string(), Some(stored.id))
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, "failed to persist event, continuing in degraded mode");
            let trace_id = normalized
                .external_id
                .clone()
                .unwrap_or_else(|| "unknown".to_string());
            (trace_id, None)
        }
        Err(e) => {
            tracing::error!(error = %e, "persistence task panicked, continuing in degraded mode");
            let trace_id = normalized
                .external_id
                .clone()
                .unwrap_or_else(|| "unknown".to_string());
            (trace_id, None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine};
    use hmac::{Hmac, Mac};
    use http::HeaderMap;
    use relay_core::{ProviderRegistry, RelaySettings, SecretSource};
    use relay_store::{DeadLetterQueue, EventRepository};
    use sha2::Sha256;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FixedSecrets(HashMap<&'static str, String>);
    impl SecretSource for FixedSecrets {
        fn secret_for(&self, name: &str) -> Option<String> {
            self.0.get(name).cloned()
        }
    }

    async fn ctx_with(base_url: String, secret: &str) -> PipelineContext {
        let secrets = FixedSecrets(HashMap::from([("form", secret.to_string())]));
        let registry = Arc::new(ProviderRegistry::with_defaults(&secrets));
        let repo = EventRepository::in_memory().unwrap();
        let dlq = DeadLetterQueue::in_memory().unwrap();
        let mut settings = RelaySettings::for_tests();
        settings.journey_service_url = base_url;
        PipelineContext::new(registry, repo, dlq, Arc::new(settings))
    }

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        STANDARD.encode(mac.finalize().into_bytes())
    }

    #[tokio::test]
    async fn happy_path_persists_and_dispatches() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/tracking/external-event"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let ctx = ctx_with(server.uri(), "s3cret").await;
        let body = br#"{"event_id":"e-1","form_response":{"form_id":"f-9","submitted_at":"2025-01-01T00:00:00Z","hidden":{"user_id":"u-1","org_id":"o-1"},"token":"tk"}}"#;
        let sig = sign("s3cret", body);
        let mut headers = HeaderMap::new();
        headers.insert("Form-Signature", format!("sha256={sig}").parse().unwrap());

        let accepted = process_webhook(&ctx, "form", &headers, body).await.unwrap();
        assert_eq!(accepted.event_type, "form_submission");
        assert_eq!(accepted.provider, "form");

        let stored = ctx.repo.get_by_external_id("form", "e-1").unwrap().unwrap();
        assert_eq!(stored.user_identifier.as_deref(), Some("u-1"));
        assert_eq!(accepted.trace_id, stored.id.to_string());

        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn idempotent_replay_keeps_one_row() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/tracking/external-event"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let ctx = ctx_with(server.uri(), "s3cret").await;
        let body = br#"{"event_id":"e-1","form_response":{"form_id":"f-9"}}"#;
        let sig = sign("s3cret", body);
        let mut headers = HeaderMap::new();
        headers.insert("Form-Signature", format!("sha256={sig}").parse().unwrap());

        let first = process_webhook(&ctx, "form", &headers, body).await.unwrap();
        let second = process_webhook(&ctx, "form", &headers, body).await.unwrap();
        assert_eq!(first.trace_id, second.trace_id);
        assert_eq!(ctx.repo.list_failed(None, 100).unwrap().len(), 0);

        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn bad_signature_rejects_without_persisting() {
        let ctx = ctx_with("http://127.0.0.1:0".to_string(), "s3cret").await;
        let body = br#"{"event_id":"e-1"}"#;
        let mut headers = HeaderMap::new();
        headers.insert("Form-Signature", "sha256=deadbeef".parse().unwrap());

        let err = process_webhook(&ctx, "form", &headers, body).await.unwrap_err();
        assert!(matches!(err, RelayError::Authentication(_)));
        assert!(ctx.repo.get_by_external_id("form", "e-1").unwrap().is_none());
    }

    #[tokio::test]
    async fn unconfigured_provider_is_rejected_before_verify() {
        let registry_secrets = FixedSecrets(HashMap::new());
        let registry = Arc::new(ProviderRegistry::with_defaults(&registry_secrets));
        let repo = EventRepository::in_memory().unwrap();
        let dlq = DeadLetterQueue::in_memory().unwrap();
        let settings = Arc::new(RelaySettings::for_tests());
        let ctx = PipelineContext::new(registry, repo, dlq, settings);

        let err = process_webhook(&ctx, "form", &HeaderMap::new(), b"{}")
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::ProviderNotConfigured(_)));
    }

    #[tokio::test]
    async fn unknown_provider_is_not_found() {
        let ctx = ctx_with("http://127.0.0.1:0".to_string(), "s3cret").await;
        let err = process_webhook(&ctx, "nonexistent", &HeaderMap::new(), b"{}")
            .await
            .unwrap_err();
        match err {
            RelayError::ProviderNotFound(detail) => {
                assert!(detail.contains("form"));
                assert!(detail.contains("payment"));
            }
            other => panic!("expected ProviderNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn provider_lookup_is_case_insensitive() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/tracking/external-event"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let ctx = ctx_with(server.uri(), "s3cret").await;
        let body = br#"{"event_id":"e-1","form_response":{"form_id":"f-9"}}"#;
        let sig = sign("s3cret", body);
        let mut headers = HeaderMap::new();
        headers.insert("Form-Signature", format!("sha256={sig}").parse().unwrap());

        let accepted = process_webhook(&ctx, "Form", &headers, body).await.unwrap();
        assert_eq!(accepted.provider, "form");

        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
