//! Producer payloads and their wire form
//!
//! `serialize_event` fills in the defaults the collector requires and
//! turns an `EventPayload` into a `PendingEvent`. Optional fields left as
//! `None` are omitted from the wire object.

use crate::error::Result;
use crate::event::PendingEvent;
use crate::providers::{Provider, UsageData};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use ulid::Ulid;

/// Usage reported by one AI vendor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawResponse {
    pub ai_model_name: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// One vendor entry of an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorResponse {
    pub vendor_name: String,
    pub raw_response: RawResponse,
}

impl VendorResponse {
    pub fn from_usage(vendor_name: impl Into<String>, usage: UsageData) -> Self {
        Self {
            vendor_name: vendor_name.into(),
            raw_response: RawResponse {
                ai_model_name: usage.model,
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
            },
        }
    }

    /// Extract usage from a provider response under the provider's default
    /// vendor name
    pub fn from_provider(provider: Provider, response: &Value) -> Self {
        Self::from_usage(provider.default_vendor(), provider.extract(response))
    }
}

/// A usage event as a producer describes it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    pub customer_external_id: String,
    pub revenue_amount_in_cents: i64,
    #[serde(default)]
    pub vendor_responses: Vec<VendorResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_request_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    /// RFC 3339 timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurred_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl EventPayload {
    pub fn new(customer_external_id: impl Into<String>, revenue_amount_in_cents: i64) -> Self {
        Self {
            customer_external_id: customer_external_id.into(),
            revenue_amount_in_cents,
            vendor_responses: Vec::new(),
            unique_request_token: None,
            customer_name: None,
            event_type: None,
            occurred_at: None,
            metadata: None,
        }
    }

    pub fn with_vendor_response(mut self, response: VendorResponse) -> Self {
        self.vendor_responses.push(response);
        self
    }

    pub fn with_request_token(mut self, token: impl Into<String>) -> Self {
        self.unique_request_token = Some(token.into());
        self
    }

    pub fn with_customer_name(mut self, name: impl Into<String>) -> Self {
        self.customer_name = Some(name.into());
        self
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn with_occurred_at(mut self, occurred_at: impl Into<String>) -> Self {
        self.occurred_at = Some(occurred_at.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Convert a payload to its wire object
///
/// Defaults: a fresh ULID for `unique_request_token`, `default_event_type`
/// for `event_type`, the current time for `occurred_at`.
pub fn serialize_event(event: EventPayload, default_event_type: &str) -> Result<PendingEvent> {
    let wire = EventPayload {
        unique_request_token: Some(
            event
                .unique_request_token
                .unwrap_or_else(|| Ulid::new().to_string()),
        ),
        event_type: Some(
            event
                .event_type
                .unwrap_or_else(|| default_event_type.to_string()),
        ),
        occurred_at: Some(
            event
                .occurred_at
                .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        ),
        ..event
    };

    let fields: Map<String, Value> = serde_json::from_value(serde_json::to_value(&wire)?)?;
    Ok(PendingEvent::new(fields))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use serde_json::json;

    fn payload() -> EventPayload {
        EventPayload::new("cust_42", 1999).with_vendor_response(VendorResponse::from_usage(
            "openai",
            UsageData {
                model: "gpt-4o".into(),
                input_tokens: 100,
                output_tokens: 20,
            },
        ))
    }

    #[test]
    fn test_defaults_filled_in() {
        let event = serialize_event(payload(), "ai_request").unwrap();

        assert_eq!(event.get("customer_external_id"), Some(&json!("cust_42")));
        assert_eq!(event.get("revenue_amount_in_cents"), Some(&json!(1999)));
        assert_eq!(event.get("event_type"), Some(&json!("ai_request")));

        let token = event.get("unique_request_token").unwrap().as_str().unwrap();
        assert!(token.parse::<Ulid>().is_ok());

        let occurred_at = event.get("occurred_at").unwrap().as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(occurred_at).is_ok());
    }

    #[test]
    fn test_tokens_unique_per_event() {
        let a = serialize_event(payload(), "ai_request").unwrap();
        let b = serialize_event(payload(), "ai_request").unwrap();
        assert_ne!(a.get("unique_request_token"), b.get("unique_request_token"));
    }

    #[test]
    fn test_explicit_values_kept() {
        let event = payload()
            .with_request_token("req-1")
            .with_event_type("embedding")
            .with_occurred_at("2025-01-15T10:30:00Z")
            .with_customer_name("Acme");

        let event = serialize_event(event, "ai_request").unwrap();

        assert_eq!(event.get("unique_request_token"), Some(&json!("req-1")));
        assert_eq!(event.get("event_type"), Some(&json!("embedding")));
        assert_eq!(event.get("occurred_at"), Some(&json!("2025-01-15T10:30:00Z")));
        assert_eq!(event.get("customer_name"), Some(&json!("Acme")));
    }

    #[test]
    fn test_none_fields_omitted() {
        let event = serialize_event(payload(), "ai_request").unwrap();

        assert!(event.get("customer_name").is_none());
        assert!(event.get("metadata").is_none());
    }

    #[test]
    fn test_vendor_response_shape() {
        let mut metadata = Map::new();
        metadata.insert("feature".into(), json!("chat"));
        let event = serialize_event(payload().with_metadata(metadata), "ai_request").unwrap();

        assert_eq!(
            event.get("vendor_responses"),
            Some(&json!([{
                "vendor_name": "openai",
                "raw_response": {
                    "ai_model_name": "gpt-4o",
                    "input_tokens": 100,
                    "output_tokens": 20
                }
            }]))
        );
        assert_eq!(event.get("metadata"), Some(&json!({ "feature": "chat" })));
    }

    #[test]
    fn test_from_provider() {
        let response = json!({
            "modelVersion": "gemini-2.0-flash",
            "usageMetadata": { "promptTokenCount": 7, "candidatesTokenCount": 3 }
        });

        let vendor = VendorResponse::from_provider(Provider::Google, &response);
        assert_eq!(vendor.vendor_name, "gemini");
        assert_eq!(vendor.raw_response.ai_model_name, "gemini-2.0-flash");
        assert_eq!(vendor.raw_response.input_tokens, 7);
    }

    #[test]
    fn test_payload_parses_from_json_line() {
        let line = r#"{"customer_external_id":"c1","revenue_amount_in_cents":50}"#;
        let payload: EventPayload = serde_json::from_str(line).unwrap();

        assert_eq!(payload.customer_external_id, "c1");
        assert!(payload.vendor_responses.is_empty());
        assert!(payload.unique_request_token.is_none());
    }
}
