//! Wire envelope: `{ "type": <tag>, "payload": <object> }`.
//!
//! Inbound envelopes are decoded permissively: the payload stays a
//! [`serde_json::Value`] at this layer and each dispatcher handler extracts
//! the fields it needs, treating a missing or wrong-typed field as a
//! per-message error rather than a fatal one. Only a frame that isn't even
//! valid JSON, or that lacks a `type` string, is rejected here.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An inbound envelope, decoded just far enough to dispatch on `tag`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEnvelope {
    #[serde(rename = "type")]
    pub tag: String,
    #[serde(default)]
    pub payload: Value,
}

impl RawEnvelope {
    /// Parse one framed text message. A frame that isn't valid JSON or has
    /// no `type` field is the only decode failure we treat as fatal to the
    /// connection (spec: "Malformed frame").
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.payload.get(name).and_then(Value::as_str)
    }
}

/// Server -> client envelopes. Serializes to the same `{type, payload}` shape.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum ServerMessage {
    UserJoined {
        user_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_name: Option<String>,
    },
    UserLeft {
        user_id: String,
    },
    Offer {
        sender_id: String,
        sdp: Value,
    },
    Answer {
        sender_id: String,
        sdp: Value,
    },
    IceCandidate {
        sender_id: String,
        candidate: Value,
    },
    ScreenShareActive {
        sharing_user_id: String,
    },
    ScreenShareStopped {
        stopped_user_id: String,
    },
    /// Keepalive extension (SPEC_FULL.md §3); payload carries nothing.
    Ping,
}

impl ServerMessage {
    pub fn to_text(&self) -> String {
        // Construction above is infallible: every variant is plain data.
        serde_json::to_string(self).expect("ServerMessage always serializes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_known_tag_with_payload() {
        let env =
            RawEnvelope::decode(r#"{"type":"join","payload":{"roomId":"r1","userId":"u1"}}"#)
                .unwrap();
        assert_eq!(env.tag, "join");
        assert_eq!(env.str_field("roomId"), Some("r1"));
        assert_eq!(env.str_field("userId"), Some("u1"));
    }

    #[test]
    fn missing_payload_defaults_to_null() {
        let env = RawEnvelope::decode(r#"{"type":"leave"}"#).unwrap();
        assert_eq!(env.tag, "leave");
        assert!(env.str_field("anything").is_none());
    }

    #[test]
    fn unparseable_frame_is_a_decode_error() {
        assert!(RawEnvelope::decode("not json").is_err());
    }

    #[test]
    fn server_message_shape_matches_wire_contract() {
        let msg = ServerMessage::UserJoined {
            user_id: "u2".into(),
            user_name: None,
        };
        let text = msg.to_text();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "userJoined");
        assert_eq!(value["payload"]["userId"], "u2");
        assert!(value["payload"].get("userName").is_none());
    }
}
