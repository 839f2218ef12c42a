//! HMAC-form provider: represents a form-submission source whose
//! signature header carries a base64-encoded HMAC-SHA256 digest behind a
//! fixed scheme tag, e.g. `sha256=...`.

use super::{constant_time_eq, Provider};
use crate::error::{RelayError, RelayResult};
use crate::event::CanonicalEvent;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use http::HeaderMap;
use serde_json::Value;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_HEADER: &str = "Form-Signature";
const SCHEME_PREFIX: &str = "sha256=";

/// Handles webhooks from a form-submission source. Trusted hidden fields
/// (user/org/enrollment/journey/step ids) travel in `form_response.hidden`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FormProvider;

impl Provider for FormProvider {
    fn name(&self) -> &'static str {
        "form"
    }

    fn signature_header(&self) -> &'static str {
        SIGNATURE_HEADER
    }

    fn verify(&self, headers: &HeaderMap, body: &[u8], secret: &str) -> bool {
        if secret.is_empty() {
            return false;
        }
        let Some(header_value) = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
        else {
            return false;
        };
        let Some(expected_b64) = header_value.strip_prefix(SCHEME_PREFIX) else {
            return false;
        };

        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(body);
        let digest = mac.finalize().into_bytes();
        let computed_b64 = STANDARD.encode(digest);

        constant_time_eq(computed_b64.as_bytes(), expected_b64.as_bytes())
    }

    fn parse(&self, body: &[u8]) -> RelayResult<Value> {
        serde_json::from_slice(body)
            .map_err(|e| RelayError::InvalidPayload(format!("malformed form payload: {e}")))
    }

    fn normalize(&self, raw: &Value) -> CanonicalEvent {
        let form_response = raw.get("form_response");
        let hidden = form_response.and_then(|fr| fr.get("hidden"));

        let str_field = |v: Option<&Value>, key: &str| -> Option<String> {
            v.and_then(|v| v.get(key))
                .and_then(Value::as_str)
                .map(str::to_owned)
        };

        let user_identifier = str_field(hidden, "user_id").or_else(|| str_field(hidden, "email"));
        let organization_id =
            str_field(hidden, "org_id").or_else(|| str_field(hidden, "organization_id"));

        let occurred_at = str_field(form_response, "submitted_at")
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        let mut metadata = serde_json::Map::new();
        metadata.insert(
            "enrollment_id".into(),
            hidden
                .and_then(|h| h.get("enrollment_id"))
                .cloned()
                .unwrap_or(Value::Null),
        );
        metadata.insert(
            "journey_id".into(),
            hidden
                .and_then(|h| h.get("journey_id"))
                .cloned()
                .unwrap_or(Value::Null),
        );
        metadata.insert(
            "step_id".into(),
            hidden
                .and_then(|h| h.get("step_id"))
                .cloned()
                .unwrap_or(Value::Null),
        );
        metadata.insert(
            "response_token".into(),
            form_response
                .and_then(|fr| fr.get("token"))
                .cloned()
                .unwrap_or(Value::Null),
        );
        metadata.insert(
            "form_id".into(),
            form_response
                .and_then(|fr| fr.get("form_id"))
                .cloned()
                .unwrap_or(Value::Null),
        );

        CanonicalEvent::new(self.name(), "form_submission")
            .with_external_id(str_field(Some(raw), "event_id"))
            .with_resource_id(str_field(form_response, "form_id"))
            .with_occurred_at(occurred_at)
            .with_user_identifier(user_identifier)
            .with_organization_id(organization_id)
            .with_metadata(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn signed_headers(secret: &str, body: &[u8]) -> HeaderMap {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let sig = STANDARD.encode(mac.finalize().into_bytes());
        let mut headers = HeaderMap::new();
        headers.insert(
            SIGNATURE_HEADER,
            HeaderValue::from_str(&format!("{SCHEME_PREFIX}{sig}")).unwrap(),
        );
        headers
    }

    #[test]
    fn verify_accepts_matching_signature() {
        let body = br#"{"event_id":"e-1"}"#;
        let headers = signed_headers("s3cret", body);
        assert!(FormProvider.verify(&headers, body, "s3cret"));
    }

    #[test]
    fn verify_rejects_one_byte_flip() {
        let body = br#"{"event_id":"e-1"}"#;
        let mut headers = signed_headers("s3cret", body);
        let bad = headers
            .get(SIGNATURE_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .replace('A', "B");
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(&bad).unwrap());
        assert!(!FormProvider.verify(&headers, body, "s3cret"));
    }

    #[test]
    fn verify_rejects_missing_secret() {
        let body = br#"{"event_id":"e-1"}"#;
        let headers = signed_headers("s3cret", body);
        assert!(!FormProvider.verify(&headers, body, ""));
    }

    #[test]
    fn verify_rejects_missing_header() {
        let body = br#"{"event_id":"e-1"}"#;
        assert!(!FormProvider.verify(&HeaderMap::new(), body, "s3cret"));
    }

    #[test]
    fn normalize_extracts_hidden_fields() {
        let raw = serde_json::json!({
            "event_id": "e-1",
            "form_response": {
                "form_id": "f-9",
                "submitted_at": "2025-01-01T00:00:00Z",
                "hidden": {"user_id": "u-1", "org_id": "o-1"},
                "token": "tk"
            }
        });
        let event = FormProvider.normalize(&raw);
        assert_eq!(event.source, "form");
        assert_eq!(event.event_type, "form_submission");
        assert_eq!(event.external_id.as_deref(), Some("e-1"));
        assert_eq!(event.user_identifier.as_deref(), Some("u-1"));
        assert_eq!(event.organization_id.as_deref(), Some("o-1"));
        assert_eq!(event.metadata.get("form_id").unwrap(), "f-9");
    }

    #[test]
    fn normalize_handles_missing_hidden_fields() {
        let raw = serde_json::json!({"event_id": "e-2", "form_response": {"form_id": "f-1"}});
        let event = FormProvider.normalize(&raw);
        assert!(event.user_identifier.is_none());
        assert!(event.organization_id.is_none());
    }

    #[test]
    fn parse_rejects_malformed_json() {
        assert!(FormProvider.parse(b"not json").is_err());
    }
}
