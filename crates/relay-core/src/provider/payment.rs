//! Payment provider: a high-assurance source with anti-replay
//! protection. The signature header is a compound string
//! `t={unix_seconds},v1={hex_sig}[,v1=...]`; multiple `v1` values must be
//! tolerated to support secret-rotation windows.

use super::{constant_time_eq, Provider};
use crate::error::{RelayError, RelayResult};
use crate::event::CanonicalEvent;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use http::HeaderMap;
use serde_json::Value;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_HEADER: &str = "Payment-Signature";
const TIMESTAMP_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Default, Clone, Copy)]
pub struct PaymentProvider;

struct ParsedSignatureHeader {
    timestamp: Option<i64>,
    signatures: Vec<String>,
}

fn parse_signature_header(header: &str) -> ParsedSignatureHeader {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for item in header.split(',') {
        let Some((key, value)) = item.split_once('=') else {
            continue;
        };
        match key.trim() {
            "t" => timestamp = value.trim().parse().ok(),
            "v1" => signatures.push(value.trim().to_string()),
            _ => {}
        }
    }

    ParsedSignatureHeader {
        timestamp,
        signatures,
    }
}

impl Provider for PaymentProvider {
    fn name(&self) -> &'static str {
        "payment"
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

        let parsed = parse_signature_header(header_value);
        let (Some(timestamp), false) = (parsed.timestamp, parsed.signatures.is_empty()) else {
            return false;
        };

        // Anti-replay precedes the HMAC check.
        let now = Utc::now().timestamp();
        if (now - timestamp).abs() > TIMESTAMP_TOLERANCE_SECS {
            return false;
        }

        let Ok(body_str) = std::str::from_utf8(body) else {
            return false;
        };
        let signed_payload = format!("{timestamp}.{body_str}");

        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(signed_payload.as_bytes());
        let expected_hex = hex::encode(mac.finalize().into_bytes());

        parsed
            .signatures
            .iter()
            .any(|sig| constant_time_eq(expected_hex.as_bytes(), sig.as_bytes()))
    }

    fn parse(&self, body: &[u8]) -> RelayResult<Value> {
        serde_json::from_slice(body)
            .map_err(|e| RelayError::InvalidPayload(format!("malformed payment payload: {e}")))
    }

    fn normalize(&self, raw: &Value) -> CanonicalEvent {
        let event_type = raw
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let data_object = raw
            .get("data")
            .and_then(|d| d.get("object"))
            .cloned()
            .unwrap_or(Value::Null);
        let metadata_in = data_object.get("metadata").cloned().unwrap_or(Value::Null);

        let field = |v: &Value, key: &str| -> Option<String> {
            v.get(key).and_then(Value::as_str).map(str::to_owned)
        };

        let customer_email =
            field(&data_object, "receipt_email").or_else(|| field(&data_object, "customer_email"));
        let user_identifier = field(&metadata_in, "user_id").or(customer_email);
        let organization_id =
            field(&metadata_in, "org_id").or_else(|| field(&metadata_in, "organization_id"));

        let occurred_at = raw
            .get("created")
            .and_then(Value::as_i64)
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .map(|dt| dt.with_timezone(&Utc));

        let resource_id = field(&data_object, "id");

        let mut metadata = serde_json::Map::new();
        metadata.insert(
            "customer_id".into(),
            data_object.get("customer").cloned().unwrap_or(Value::Null),
        );
        metadata.insert(
            "amount".into(),
            data_object.get("amount").cloned().unwrap_or(Value::Null),
        );
        metadata.insert(
            "currency".into(),
            data_object.get("currency").cloned().unwrap_or(Value::Null),
        );
        metadata.insert(
            "status".into(),
            data_object.get("status").cloned().unwrap_or(Value::Null),
        );
        metadata.insert(
            "enrollment_id".into(),
            metadata_in.get("enrollment_id").cloned().unwrap_or(Value::Null),
        );
        metadata.insert(
            "journey_id".into(),
            metadata_in.get("journey_id").cloned().unwrap_or(Value::Null),
        );
        metadata.insert(
            "step_id".into(),
            metadata_in.get("step_id").cloned().unwrap_or(Value::Null),
        );
        metadata.insert(
            "payment_intent_id".into(),
            if event_type.starts_with("payment_intent") {
                resource_id.clone().map(Value::String).unwrap_or(Value::Null)
            } else {
                Value::Null
            },
        );
        metadata.insert(
            "subscription_id".into(),
            if event_type.starts_with("customer.subscription") {
                resource_id.clone().map(Value::String).unwrap_or(Value::Null)
            } else {
                Value::Null
            },
        );
        metadata.insert(
            "invoice_id".into(),
            if event_type.starts_with("invoice") {
                resource_id.clone().map(Value::String).unwrap_or(Value::Null)
            } else {
                Value::Null
            },
        );

        CanonicalEvent::new(self.name(), event_type)
            .with_external_id(field(raw, "id"))
            .with_resource_id(resource_id)
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

    fn sign(secret: &str, timestamp: i64, body: &[u8]) -> String {
        let signed_payload = format!("{timestamp}.{}", std::str::from_utf8(body).unwrap());
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(signed_payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn headers_at(secret: &str, timestamp: i64, body: &[u8]) -> HeaderMap {
        let sig = sign(secret, timestamp, body);
        let mut headers = HeaderMap::new();
        headers.insert(
            SIGNATURE_HEADER,
            HeaderValue::from_str(&format!("t={timestamp},v1={sig}")).unwrap(),
        );
        headers
    }

    #[test]
    fn verify_accepts_fresh_valid_signature() {
        let body = br#"{"id":"evt_1","type":"payment_intent.succeeded"}"#;
        let now = Utc::now().timestamp();
        let headers = headers_at("whsec", now, body);
        assert!(PaymentProvider.verify(&headers, body, "whsec"));
    }

    #[test]
    fn verify_tolerates_multiple_v1_values_for_rotation() {
        let body = br#"{"id":"evt_1"}"#;
        let now = Utc::now().timestamp();
        let good_sig = sign("whsec", now, body);
        let mut headers = HeaderMap::new();
        headers.insert(
            SIGNATURE_HEADER,
            HeaderValue::from_str(&format!("t={now},v1=deadbeef,v1={good_sig}")).unwrap(),
        );
        assert!(PaymentProvider.verify(&headers, body, "whsec"));
    }

    #[test]
    fn verify_rejects_replay_outside_tolerance() {
        let body = br#"{"id":"evt_1"}"#;
        let stale = Utc::now().timestamp() - 600;
        let headers = headers_at("whsec", stale, body);
        assert!(!PaymentProvider.verify(&headers, body, "whsec"));
    }

    #[test]
    fn verify_rejects_tampered_body() {
        let body = br#"{"id":"evt_1"}"#;
        let now = Utc::now().timestamp();
        let headers = headers_at("whsec", now, body);
        assert!(!PaymentProvider.verify(&headers, b"{\"id\":\"evt_2\"}", "whsec"));
    }

    #[test]
    fn normalize_surfaces_payment_intent_id() {
        let raw = serde_json::json!({
            "id": "evt_1",
            "type": "payment_intent.succeeded",
            "created": 1_700_000_000,
            "data": {"object": {"id": "pi_123", "amount": 500, "currency": "usd", "status": "succeeded",
                "metadata": {"user_id": "u-1", "org_id": "o-1"}}}
        });
        let event = PaymentProvider.normalize(&raw);
        assert_eq!(event.event_type, "payment_intent.succeeded");
        assert_eq!(event.external_id.as_deref(), Some("evt_1"));
        assert_eq!(event.resource_id.as_deref(), Some("pi_123"));
        assert_eq!(event.user_identifier.as_deref(), Some("u-1"));
        assert_eq!(event.metadata.get("payment_intent_id").unwrap(), "pi_123");
        assert!(event.metadata.get("subscription_id").unwrap().is_null());
        assert!(event.occurred_at.is_some());
    }

    #[test]
    fn normalize_falls_back_to_customer_email() {
        let raw = serde_json::json!({
            "id": "evt_2", "type": "charge.succeeded",
            "data": {"object": {"id": "ch_1", "receipt_email": "buyer@example.com"}}
        });
        let event = PaymentProvider.normalize(&raw);
        assert_eq!(event.user_identifier.as_deref(), Some("buyer@example.com"));
    }
}
