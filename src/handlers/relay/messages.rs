//! Client-facing relay protocol messages.
//!
//! The relay forwards provider traffic verbatim; the only frames it
//! originates itself are error frames with the shape
//! `{"type":"error","error":{"message":...,"type":...}}`.

use serde::{Deserialize, Serialize};

use crate::core::relay::RelayFrame;

/// Error categories surfaced to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayErrorKind {
    /// The upstream connection failed or closed unexpectedly
    ConnectionError,
    /// The session-initiation message could not be delivered
    SessionInitError,
    /// The upstream socket reported open but refused the first send
    ConnectionNotReady,
    /// A message arrived with no live upstream session; the client must
    /// re-initiate with a new `session.create`
    ConnectionLost,
    /// Forwarding a message to the upstream failed
    SendError,
    /// An internal relay failure
    ServerError,
}

impl RelayErrorKind {
    /// Wire value of the error type discriminant.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectionError => "connection_error",
            Self::SessionInitError => "session_init_error",
            Self::ConnectionNotReady => "connection_not_ready",
            Self::ConnectionLost => "connection_lost",
            Self::SendError => "send_error",
            Self::ServerError => "server_error",
        }
    }
}

impl std::fmt::Display for RelayErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Build the error frame emitted to the client.
pub fn error_frame(kind: RelayErrorKind, message: impl Into<String>) -> RelayFrame {
    RelayFrame::Json(serde_json::json!({
        "type": "error",
        "error": {
            "message": message.into(),
            "type": kind.as_str(),
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_wire_values() {
        assert_eq!(RelayErrorKind::ConnectionError.as_str(), "connection_error");
        assert_eq!(RelayErrorKind::SessionInitError.as_str(), "session_init_error");
        assert_eq!(
            RelayErrorKind::ConnectionNotReady.as_str(),
            "connection_not_ready"
        );
        assert_eq!(RelayErrorKind::ConnectionLost.as_str(), "connection_lost");
        assert_eq!(RelayErrorKind::SendError.as_str(), "send_error");
        assert_eq!(RelayErrorKind::ServerError.as_str(), "server_error");
    }

    #[test]
    fn test_error_kind_serde_matches_wire_value() {
        let json = serde_json::to_string(&RelayErrorKind::ConnectionLost).unwrap();
        assert_eq!(json, r#""connection_lost""#);

        let kind: RelayErrorKind = serde_json::from_str(r#""send_error""#).unwrap();
        assert_eq!(kind, RelayErrorKind::SendError);
    }

    #[test]
    fn test_error_frame_shape() {
        let frame = error_frame(RelayErrorKind::ConnectionLost, "upstream connection lost");
        match frame {
            RelayFrame::Json(value) => {
                assert_eq!(value["type"], "error");
                assert_eq!(value["error"]["type"], "connection_lost");
                assert_eq!(value["error"]["message"], "upstream connection lost");
            }
            _ => panic!("Expected Json frame"),
        }
    }
}
