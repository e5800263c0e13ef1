//! MIST Message Envelope
//!
//! The generic envelope shared by the ingest endpoint and the trace
//! collector: a typed JSON payload plus routing metadata.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope protocol version
pub const PROTOCOL_VERSION: &str = "1";

/// Message type of an inbound inference request
pub const TYPE_INFER_REQUEST: &str = "infer.request";
/// Message type of an inference reply
pub const TYPE_INFER_RESPONSE: &str = "infer.response";
/// Message type of a reported trace span
pub const TYPE_TRACE_SPAN: &str = "trace.span";

/// A MIST message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Protocol version
    #[serde(default = "default_version")]
    pub version: String,
    /// Unique message ID
    #[serde(default)]
    pub id: String,
    /// Emitting service
    #[serde(default)]
    pub source: String,
    /// Message type (e.g. `infer.request`)
    #[serde(rename = "type")]
    pub kind: String,
    /// Creation time, nanoseconds since the Unix epoch
    #[serde(default)]
    pub timestamp_ns: i64,
    /// Type-specific body
    #[serde(default)]
    pub payload: serde_json::Value,
}

fn default_version() -> String {
    PROTOCOL_VERSION.to_string()
}

impl Message {
    /// Wrap `payload` in a fresh envelope
    pub fn new<T: Serialize>(
        source: impl Into<String>,
        kind: impl Into<String>,
        payload: &T,
    ) -> serde_json::Result<Self> {
        Ok(Self {
            version: default_version(),
            id: Uuid::new_v4().to_string(),
            source: source.into(),
            kind: kind.into(),
            timestamp_ns: Utc::now().timestamp_nanos_opt().unwrap_or_default(),
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Decode the payload
    pub fn decode<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_fills_metadata() {
        let msg = Message::new("infermux", TYPE_INFER_RESPONSE, &json!({"content": "hi"})).unwrap();
        assert_eq!(msg.version, "1");
        assert_eq!(msg.kind, "infer.response");
        assert!(Uuid::parse_str(&msg.id).is_ok());
        assert!(msg.timestamp_ns > 0);
        assert_eq!(msg.payload["content"], "hi");
    }

    #[test]
    fn test_minimal_envelope_parses() {
        let msg: Message =
            serde_json::from_value(json!({"type": "infer.request", "payload": {"prompt": "x"}}))
                .unwrap();
        assert_eq!(msg.version, PROTOCOL_VERSION);
        assert_eq!(msg.kind, TYPE_INFER_REQUEST);
        assert!(msg.id.is_empty());
        assert_eq!(msg.payload["prompt"], "x");
    }

    #[test]
    fn test_type_is_the_wire_name() {
        let msg = Message::new("svc", TYPE_TRACE_SPAN, &json!({})).unwrap();
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "trace.span");
        assert!(value.get("kind").is_none());
    }
}
