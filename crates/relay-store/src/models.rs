//! Row types for the `events` and `dead_letter_queue` tables.

use chrono::{DateTime, Utc};
use relay_core::CanonicalEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Received,
    Processing,
    Processed,
    Failed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "received" => Some(Self::Received),
            "processing" => Some(Self::Processing),
            "processed" => Some(Self::Processed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// True if moving from `self` to `next` respects the monotonic ladder
    /// `received -> processing -> {processed | failed}`.
    ///
    /// `Failed -> Processing` is the one extension beyond a strict
    /// left-to-right reading of that ladder: the DLQ sweep re-attempts
    /// delivery for an already-`failed` event and must be able to land on
    /// `processed` when a later retry succeeds. Every other backward move
    /// (in particular anything out of a terminal `Processed`) stays
    /// forbidden.
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Received, Self::Processing)
                | (Self::Processing, Self::Processed)
                | (Self::Processing, Self::Failed)
                | (Self::Failed, Self::Processing)
        )
    }
}

/// One row per accepted webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: Uuid,
    pub provider: String,
    pub event_type: String,
    pub external_id: Option<String>,
    pub user_identifier: Option<String>,
    pub organization_id: Option<String>,
    pub raw_payload: Value,
    pub normalized_payload: CanonicalEvent,
    pub status: EventStatus,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DlqStatus {
    Pending,
    Retrying,
    Resolved,
    Abandoned,
}

impl DlqStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Retrying => "retrying",
            Self::Resolved => "resolved",
            Self::Abandoned => "abandoned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "retrying" => Some(Self::Retrying),
            "resolved" => Some(Self::Resolved),
            "abandoned" => Some(Self::Abandoned),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Abandoned)
    }
}

/// One-to-zero-or-one with a [`StoredEvent`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEntry {
    pub id: Uuid,
    pub event_id: Uuid,
    pub error_message: String,
    pub retry_count: u32,
    pub max_retries: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub status: DlqStatus,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate counts returned by `DLQ::stats`.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DlqStats {
    pub pending: u64,
    pub retrying: u64,
    pub resolved: u64,
    pub abandoned: u64,
    pub total: u64,
}
