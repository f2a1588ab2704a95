//! Wire frame types — the exact JSON record exchanged between peers.
//!
//! Every frame is a UTF-8 JSON object:
//!
//! ```json
//! {
//!   "type": "chat:post",
//!   "payload": { "body": "ahoy" },
//!   "metadata": {
//!     "id": "0192f3a1-...",
//!     "created": "2026-08-06T12:00:00.000Z",
//!     "synchronous": true,
//!     "timeout": 1500,
//!     "to": "0192f3a0-..."
//!   }
//! }
//! ```
//!
//! Outbound frames always carry the full metadata block; `timeout` is the
//! reply window in milliseconds or the literal `false` when none is set, and
//! `to` is omitted unless the frame is a reply. Inbound frames from foreign
//! peers may omit `payload` or any metadata field and still decode.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A decoded wire frame.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Frame {
    /// Message type tag.
    #[serde(rename = "type")]
    pub kind: String,
    /// Message payload (defaults to an empty object).
    #[serde(default = "empty_object")]
    pub payload: Value,
    /// Correlation metadata.
    #[serde(default)]
    pub metadata: FrameMetadata,
}

/// The metadata block of a wire frame.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FrameMetadata {
    /// Message identifier. Absent on hand-built frames; a fresh ID is
    /// generated during message construction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Creation timestamp, RFC 3339.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    /// Whether the sender expects a correlated reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synchronous: Option<bool>,
    /// Reply window in milliseconds, encoded as `false` when unset.
    #[serde(default, with = "timeout_millis")]
    pub timeout: Option<u64>,
    /// ID of the message this frame replies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

impl Frame {
    /// Decode a frame from raw UTF-8 text.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Encode the frame to its wire representation.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Serde adapter for the `number|false` timeout field.
mod timeout_millis {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ms) => serializer.serialize_u64(*ms),
            None => serializer.serialize_bool(false),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null | Value::Bool(false)) => Ok(None),
            Some(Value::Number(n)) => match n.as_u64() {
                Some(0) => Ok(None),
                Some(ms) => Ok(Some(ms)),
                None => Err(D::Error::custom("timeout must be a positive integer")),
            },
            Some(other) => Err(D::Error::custom(format!(
                "timeout must be a number or false, got {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_frame() -> Frame {
        Frame {
            kind: "chat:post".into(),
            payload: json!({"body": "ahoy"}),
            metadata: FrameMetadata {
                id: Some("msg-1".into()),
                created: Some("2026-08-06T12:00:00.000Z".into()),
                synchronous: Some(true),
                timeout: Some(1500),
                to: Some("msg-0".into()),
            },
        }
    }

    // ── Encoding ────────────────────────────────────────────────────

    #[test]
    fn encode_full_frame() {
        let json = full_frame().encode().unwrap();
        let v: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["type"], "chat:post");
        assert_eq!(v["payload"]["body"], "ahoy");
        assert_eq!(v["metadata"]["id"], "msg-1");
        assert_eq!(v["metadata"]["synchronous"], true);
        assert_eq!(v["metadata"]["timeout"], 1500);
        assert_eq!(v["metadata"]["to"], "msg-0");
    }

    #[test]
    fn encode_timeout_none_as_false() {
        let mut frame = full_frame();
        frame.metadata.timeout = None;
        let json = frame.encode().unwrap();
        let v: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["metadata"]["timeout"], false);
    }

    #[test]
    fn encode_omits_absent_to() {
        let mut frame = full_frame();
        frame.metadata.to = None;
        let json = frame.encode().unwrap();
        let v: Value = serde_json::from_str(&json).unwrap();
        assert!(v["metadata"].get("to").is_none());
    }

    #[test]
    fn kind_field_serializes_as_type() {
        let json = full_frame().encode().unwrap();
        let v: Value = serde_json::from_str(&json).unwrap();
        assert!(v.get("type").is_some());
        assert!(v.get("kind").is_none());
    }

    // ── Decoding ────────────────────────────────────────────────────

    #[test]
    fn decode_full_frame() {
        let raw = r#"{
            "type": "chat:post",
            "payload": {"body": "ahoy"},
            "metadata": {
                "id": "msg-1",
                "created": "2026-08-06T12:00:00.000Z",
                "synchronous": true,
                "timeout": 1500,
                "to": "msg-0"
            }
        }"#;
        let frame = Frame::decode(raw).unwrap();
        assert_eq!(frame.kind, "chat:post");
        assert_eq!(frame.payload["body"], "ahoy");
        assert_eq!(frame.metadata.id.as_deref(), Some("msg-1"));
        assert_eq!(frame.metadata.synchronous, Some(true));
        assert_eq!(frame.metadata.timeout, Some(1500));
        assert_eq!(frame.metadata.to.as_deref(), Some("msg-0"));
    }

    #[test]
    fn decode_minimal_frame() {
        // Foreign peers may send nothing but a type and a `to` link.
        let raw = r#"{"type": "test:reply", "metadata": {"to": "msg-7"}}"#;
        let frame = Frame::decode(raw).unwrap();
        assert_eq!(frame.kind, "test:reply");
        assert!(frame.payload.as_object().unwrap().is_empty());
        assert!(frame.metadata.id.is_none());
        assert!(frame.metadata.synchronous.is_none());
        assert!(frame.metadata.timeout.is_none());
        assert_eq!(frame.metadata.to.as_deref(), Some("msg-7"));
    }

    #[test]
    fn decode_without_metadata() {
        let raw = r#"{"type": "test:bare"}"#;
        let frame = Frame::decode(raw).unwrap();
        assert_eq!(frame.kind, "test:bare");
        assert!(frame.metadata.id.is_none());
        assert!(frame.metadata.to.is_none());
    }

    #[test]
    fn decode_timeout_false_as_none() {
        let raw = r#"{"type": "t", "metadata": {"timeout": false}}"#;
        let frame = Frame::decode(raw).unwrap();
        assert!(frame.metadata.timeout.is_none());
    }

    #[test]
    fn decode_timeout_zero_as_none() {
        let raw = r#"{"type": "t", "metadata": {"timeout": 0}}"#;
        let frame = Frame::decode(raw).unwrap();
        assert!(frame.metadata.timeout.is_none());
    }

    #[test]
    fn decode_timeout_string_rejected() {
        let raw = r#"{"type": "t", "metadata": {"timeout": "soon"}}"#;
        assert!(Frame::decode(raw).is_err());
    }

    #[test]
    fn decode_missing_type_rejected() {
        let raw = r#"{"payload": {}}"#;
        assert!(Frame::decode(raw).is_err());
    }

    #[test]
    fn decode_garbage_rejected() {
        assert!(Frame::decode("not json at all").is_err());
        assert!(Frame::decode("[1,2,3]").is_err());
        assert!(Frame::decode("").is_err());
    }

    // ── Round trip ──────────────────────────────────────────────────

    #[test]
    fn roundtrip_preserves_fields() {
        let frame = full_frame();
        let back = Frame::decode(&frame.encode().unwrap()).unwrap();
        assert_eq!(back.kind, frame.kind);
        assert_eq!(back.payload, frame.payload);
        assert_eq!(back.metadata.id, frame.metadata.id);
        assert_eq!(back.metadata.created, frame.metadata.created);
        assert_eq!(back.metadata.synchronous, frame.metadata.synchronous);
        assert_eq!(back.metadata.timeout, frame.metadata.timeout);
        assert_eq!(back.metadata.to, frame.metadata.to);
    }

    #[test]
    fn roundtrip_without_timeout() {
        let mut frame = full_frame();
        frame.metadata.timeout = None;
        let back = Frame::decode(&frame.encode().unwrap()).unwrap();
        assert!(back.metadata.timeout.is_none());
    }
}
