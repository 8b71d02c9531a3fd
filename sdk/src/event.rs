//! Pending event envelope
//!
//! A `PendingEvent` is an already-serialized JSON object waiting in the
//! buffer. The shipper never looks inside it; identity and ordering come
//! from insertion order only.

use serde::Serialize;
use serde_json::{Map, Value};

/// An opaque, already-serialized event
///
/// # Example
///
/// ```
/// use margindash::event::PendingEvent;
/// use serde_json::json;
///
/// let event = PendingEvent::from_value(json!({"customer_external_id": "cust_1"})).unwrap();
/// assert_eq!(event.get("customer_external_id"), Some(&json!("cust_1")));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PendingEvent {
    fields: Map<String, Value>,
}

impl PendingEvent {
    /// Wrap a JSON object
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Wrap a JSON value; returns `None` unless it is an object
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    /// Look up a top-level field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Borrow the underlying object
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Take the underlying object
    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }
}

impl From<Map<String, Value>> for PendingEvent {
    fn from(fields: Map<String, Value>) -> Self {
        Self::new(fields)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value_accepts_objects_only() {
        assert!(PendingEvent::from_value(json!({"a": 1})).is_some());
        assert!(PendingEvent::from_value(json!([1, 2])).is_none());
        assert!(PendingEvent::from_value(json!("text")).is_none());
    }

    #[test]
    fn test_serializes_transparently() {
        let event = PendingEvent::from_value(json!({"id": "e1", "n": 3})).unwrap();
        let encoded = serde_json::to_value(&event).unwrap();
        assert_eq!(encoded, json!({"id": "e1", "n": 3}));
    }

    #[test]
    fn test_into_fields() {
        let event = PendingEvent::from_value(json!({"k": "v"})).unwrap();
        let fields = event.into_fields();
        assert_eq!(fields.get("k"), Some(&json!("v")));
    }
}
