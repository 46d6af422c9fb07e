//! Live channel wire frames.
//!
//! Every frame is a JSON text message. The client opens with `{"token": ...}`,
//! the server acknowledges with `{"type": "connected", ...}` and may probe
//! with `{"type": "ping"}`, which must be answered with `{"type": "pong"}`.
//! Everything else is an application event.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Frames the client writes.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    /// First frame on every socket. The credential never goes in the URL.
    Auth { token: String },
    Pong,
    /// Caller-supplied payload, passed through as-is.
    Message(Value),
}

impl ClientFrame {
    pub fn encode(&self) -> String {
        match self {
            ClientFrame::Auth { token } => json!({ "token": token }).to_string(),
            ClientFrame::Pong => json!({ "type": "pong" }).to_string(),
            ClientFrame::Message(value) => value.to_string(),
        }
    }
}

/// An application event delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LiveMessage {
    Json(Value),
    /// Payload that was not valid JSON, passed through verbatim.
    Raw(String),
}

impl LiveMessage {
    /// The event's `type` field, e.g. `"email_classified"` or `"sync_complete"`.
    pub fn kind(&self) -> Option<&str> {
        match self {
            LiveMessage::Json(value) => value.get("type").and_then(Value::as_str),
            LiveMessage::Raw(_) => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            LiveMessage::Json(value) => Some(value),
            LiveMessage::Raw(_) => None,
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, LiveMessage::Raw(_))
    }
}

/// A decoded server frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerFrame {
    /// Authentication acknowledgment; carries the full frame.
    Connected(Value),
    Ping,
    Message(LiveMessage),
    /// Payload failed to decode as JSON.
    Malformed { raw: String, error: String },
}

impl ServerFrame {
    pub fn parse(text: &str) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => match value.get("type").and_then(Value::as_str) {
                Some("connected") => ServerFrame::Connected(value),
                Some("ping") => ServerFrame::Ping,
                _ => ServerFrame::Message(LiveMessage::Json(value)),
            },
            Err(e) => ServerFrame::Malformed {
                raw: text.to_string(),
                error: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_frame_encoding() {
        let frame = ClientFrame::Auth {
            token: "abc".to_string(),
        };
        let value: Value = serde_json::from_str(&frame.encode()).unwrap();
        assert_eq!(value, json!({ "token": "abc" }));
    }

    #[test]
    fn test_pong_encoding() {
        let value: Value = serde_json::from_str(&ClientFrame::Pong.encode()).unwrap();
        assert_eq!(value, json!({ "type": "pong" }));
    }

    #[test]
    fn test_parse_connected() {
        let frame = ServerFrame::parse(r#"{"type":"connected","user_id":"u1"}"#);
        match frame {
            ServerFrame::Connected(value) => assert_eq!(value["user_id"], "u1"),
            other => panic!("expected Connected, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_ping() {
        assert_eq!(ServerFrame::parse(r#"{"type":"ping"}"#), ServerFrame::Ping);
    }

    #[test]
    fn test_parse_application_event() {
        let frame = ServerFrame::parse(r#"{"type":"email_classified","email_id":7}"#);
        match frame {
            ServerFrame::Message(message) => {
                assert_eq!(message.kind(), Some("email_classified"));
                assert_eq!(message.as_json().unwrap()["email_id"], 7);
            }
            other => panic!("expected Message, got {:?}", other),
        }
    }

    #[test]
    fn test_untyped_json_is_still_a_message() {
        let frame = ServerFrame::parse(r#"[1,2,3]"#);
        match frame {
            ServerFrame::Message(message) => assert_eq!(message.kind(), None),
            other => panic!("expected Message, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_malformed() {
        let frame = ServerFrame::parse("sync done!");
        match frame {
            ServerFrame::Malformed { raw, error } => {
                assert_eq!(raw, "sync done!");
                assert!(!error.is_empty());
            }
            other => panic!("expected Malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_raw_message_has_no_kind() {
        let message = LiveMessage::Raw("hello".to_string());
        assert!(message.is_raw());
        assert_eq!(message.kind(), None);
        assert!(message.as_json().is_none());
    }
}
