//! Dispatcher transport: exactly one outbound HTTP attempt per call.
//! In-process retry policy and DLQ hand-off live in `relay-pipeline`; this
//! crate only knows how to make the request and classify the response.

use relay_core::CanonicalEvent;
use std::time::Duration;
use thiserror::Error;

const EVENT_SOURCE_HEADER: &str = "X-Event-Source";
const EVENT_SOURCE_VALUE: &str = "webhook_service";
const TRACKING_PATH: &str = "/api/v1/tracking/external-event";

#[derive(Debug, Error, Clone)]
pub enum DispatchError {
    /// Network error, timeout, or 5xx. Should be retried.
    #[error("transient downstream failure: {0}")]
    Transient(String),
    /// 4xx. Retrying will not help.
    #[error("permanent downstream failure: {0}")]
    Permanent(String),
}

impl DispatchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Talks to the downstream consumer's tracking endpoint.
#[derive(Clone)]
pub struct DownstreamClient {
    http: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl DownstreamClient {
    pub fn new(base_url: impl Into<String>, bearer_token: Option<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client configuration is valid");
        Self {
            http,
            base_url: base_url.into(),
            bearer_token,
        }
    }

    /// POST the canonical event once; classify the outcome, never retry.
    pub async fn send_once(&self, event: &CanonicalEvent) -> Result<(), DispatchError> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), TRACKING_PATH);

        let mut request = self
            .http
            .post(&url)
            .header(EVENT_SOURCE_HEADER, EVENT_SOURCE_VALUE)
            .header("Content-Type", "application/json")
            .json(event);

        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DispatchError::Transient(format!("network error: {e}")))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status.is_server_error() {
            Err(DispatchError::Transient(format!("downstream status {status}")))
        } else {
            // Any other non-2xx (4xx and other non-2xx codes
            // are treated as retryable here; downstream's own business logic
            // 4xx responses are rare on an internal tracking endpoint and the
            // spec classifies "any non-2xx" as retryable for this surface).
            Err(DispatchError::Transient(format!("downstream status {status}")))
        }
    }
}
