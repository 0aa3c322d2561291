//! Relay frame classification.
//!
//! Every message crossing the relay is normalized into a [`RelayFrame`]
//! before forwarding. Classification is best-effort: a frame the transport
//! marks as binary is opaque audio and is never inspected; a text frame is
//! parsed as JSON when possible and carried as plain text otherwise. The
//! relay never drops a frame because it failed to parse.

use bytes::Bytes;
use serde_json::Value;

/// Message kind that triggers lazy upstream session establishment.
pub const SESSION_CREATE_TYPE: &str = "session.create";

/// A discriminated frame travelling through the relay in either direction.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayFrame {
    /// Opaque binary payload (audio). Forwarded without inspection.
    Binary(Bytes),
    /// Structured JSON payload.
    Json(Value),
    /// Text payload that failed JSON parsing. Forwarded as-is.
    Text(String),
}

impl RelayFrame {
    /// Classify a text payload: JSON when it parses, plain text otherwise.
    pub fn from_text(text: &str) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => RelayFrame::Json(value),
            Err(_) => RelayFrame::Text(text.to_string()),
        }
    }

    /// The `type` discriminant of a JSON frame, if present.
    pub fn message_type(&self) -> Option<&str> {
        match self {
            RelayFrame::Json(value) => value.get("type").and_then(Value::as_str),
            _ => None,
        }
    }

    /// Whether this frame is the session-initiation message.
    pub fn is_session_create(&self) -> bool {
        self.message_type() == Some(SESSION_CREATE_TYPE)
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, RelayFrame::Binary(_))
    }
}
