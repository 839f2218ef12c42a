//! The canonical, provider-agnostic event shape consumed downstream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The normalized form produced by any provider's `normalize`.
///
/// Every field but `source` and `event_type` is optional: a provider that
/// doesn't mint an id, or a payload that doesn't carry a timestamp, maps to
/// `None` rather than a sentinel value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalEvent {
    pub source: String,
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurred_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl CanonicalEvent {
    /// Build an event with only the fields every provider can fill in;
    /// providers then thread their specifics through the builder methods.
    pub fn new(source: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            event_type: event_type.into(),
            external_id: None,
            resource_id: None,
            occurred_at: None,
            user_identifier: None,
            organization_id: None,
            metadata: Map::new(),
        }
    }

    pub fn with_external_id(mut self, id: Option<String>) -> Self {
        self.external_id = id;
        self
    }

    pub fn with_resource_id(mut self, id: Option<String>) -> Self {
        self.resource_id = id;
        self
    }

    pub fn with_occurred_at(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.occurred_at = at;
        self
    }

    pub fn with_user_identifier(mut self, id: Option<String>) -> Self {
        self.user_identifier = id;
        self
    }

    pub fn with_organization_id(mut self, id: Option<String>) -> Self {
        self.organization_id = id;
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}
