//! Error types for the webhook relay.
//!
//! Mirrors the failure taxonomy of the ingestion pipeline: authentication,
//! configuration, malformed input, and transient/permanent downstream
//! failures each get their own variant so callers can map them to the
//! right HTTP status without string matching.

use thiserror::Error;

/// Result type alias for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

#[derive(Error, Debug)]
pub enum RelayError {
    /// Signature missing, secret missing, signature mismatch, or replay
    /// outside the anti-replay tolerance window.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The URL path segment does not match any registered provider.
    #[error("unknown provider: {0}")]
    ProviderNotFound(String),

    /// The provider is registered but has no secret configured.
    #[error("provider not configured: {0}")]
    ProviderNotConfigured(String),

    /// The request body could not be parsed into the provider's expected shape.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// A downstream dispatch attempt failed in a way that should be retried.
    #[error("transient dispatch failure: {0}")]
    Transient(String),

    /// A downstream dispatch attempt failed in a way retrying will not fix.
    #[error("permanent dispatch failure: {0}")]
    Permanent(String),

    /// The persistent store could not complete an operation.
    #[error("database error: {0}")]
    Database(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for RelayError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transient(err.to_string())
    }
}
