//! HTTP error envelope: maps the ingestion-path failure
//! categories (authentication, configuration, malformed input) onto the
//! four documented responses. Downstream-dispatch failures never reach here; they
//! are logged and handed to the DLQ inside `relay-pipeline`.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use relay_core::RelayError;
use serde::Serialize;

#[derive(Debug)]
pub struct RelayApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl RelayApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope<'a> {
    success: bool,
    error: ErrorBody<'a>,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
}

impl IntoResponse for RelayApiError {
    fn into_response(self) -> Response {
        let body = ErrorEnvelope {
            success: false,
            error: ErrorBody {
                code: self.code,
                message: &self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

/// Maps the ingestion path's `RelayError` onto the four documented HTTP
/// responses: `provider_not_found`, `provider_not_configured`,
/// `invalid_payload`, `unauthorized`. Anything outside that taxonomy is a
/// programming error, not a caller-visible category, and surfaces as a
/// plain 500; it should never actually be reached from `process_webhook`.
impl From<RelayError> for RelayApiError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::ProviderNotFound(detail) => RelayApiError::new(
                StatusCode::NOT_FOUND,
                "provider_not_found",
                format!("unknown provider: {detail}"),
            ),
            RelayError::ProviderNotConfigured(name) => RelayApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "provider_not_configured",
                format!("provider not configured: {name}"),
            ),
            RelayError::InvalidPayload(msg) => {
                RelayApiError::new(StatusCode::BAD_REQUEST, "invalid_payload", msg)
            }
            RelayError::Authentication(msg) => {
                RelayApiError::new(StatusCode::UNAUTHORIZED, "unauthorized", msg)
            }
            other => RelayApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                other.to_string(),
            ),
        }
    }
}

pub type RelayApiResult<T> = Result<T, RelayApiError>;
