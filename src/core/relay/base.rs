//! Base types for the upstream realtime session client.
//!
//! The relay talks to the provider through the [`UpstreamConnector`] trait.
//! The production implementation ([`super::upstream::RealtimeConnector`])
//! opens a WebSocket to the OpenAI Realtime API; tests substitute a fake
//! connector backed by channels, so the per-connection state machine is
//! exercised without any network I/O.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use super::frame::RelayFrame;

/// Channel capacity for upstream frame sending.
pub const UPSTREAM_CHANNEL_CAPACITY: usize = 256;

/// Normal closure. The provider ends every completed turn with this code;
/// it is an expected terminal state, not a failure.
pub const NORMAL_CLOSE_CODE: u16 = 1000;

/// Abnormal closure reported when the transport ends without a close frame.
pub const ABNORMAL_CLOSE_CODE: u16 = 1006;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur on the upstream leg of the relay.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The outbound connection was rejected or errored before open
    #[error("connection failed: {0}")]
    ConnectFailure(String),

    /// A send was attempted while the upstream transport is not open
    #[error("upstream transport is not open")]
    NotOpen,

    /// WebSocket transport error
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// Frame serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

// =============================================================================
// Configuration
// =============================================================================

/// Connection parameters for one upstream realtime session.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Base WebSocket URL of the provider's realtime endpoint.
    pub url: String,
    /// Bearer credential presented in the connection headers.
    pub api_key: String,
    /// Model identifier appended as a query parameter.
    pub model: String,
}

impl UpstreamConfig {
    /// Full endpoint with the model parameter.
    pub fn endpoint(&self) -> String {
        format!("{}?model={}", self.url, self.model)
    }
}

// =============================================================================
// Events
// =============================================================================

/// Events emitted by an open upstream session.
///
/// `Closed` is always the final event. Transport errors emit `Error`
/// followed by `Closed`; the session performs no retry internally, so
/// resumption policy lives with the owning connection handler.
#[derive(Debug)]
pub enum UpstreamEvent {
    /// An inbound frame from the provider.
    Frame(RelayFrame),
    /// The upstream connection closed. Code 1000 is expected.
    Closed { code: u16, reason: String },
    /// A transport error. Terminal; a `Closed` event follows.
    Error(String),
}

// =============================================================================
// Session Handle
// =============================================================================

/// Send-side handle to an open upstream session.
///
/// Dropping the handle initiates closure of the upstream connection.
pub struct UpstreamHandle {
    outbound: mpsc::Sender<RelayFrame>,
}

impl std::fmt::Debug for UpstreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamHandle").finish_non_exhaustive()
    }
}

impl UpstreamHandle {
    pub fn new(outbound: mpsc::Sender<RelayFrame>) -> Self {
        Self { outbound }
    }

    /// Queue a frame for sending. Fails with [`RelayError::NotOpen`] once
    /// the transport has shut down.
    pub async fn send(&self, frame: RelayFrame) -> RelayResult<()> {
        self.outbound
            .send(frame)
            .await
            .map_err(|_| RelayError::NotOpen)
    }
}

// =============================================================================
// Connector Trait
// =============================================================================

/// Opens outbound realtime sessions.
///
/// Implementations deliver all session activity through the `events`
/// channel supplied at open time, ending with a single `Closed` event.
#[async_trait]
pub trait UpstreamConnector: Send + Sync + 'static {
    /// Establish one outbound connection to the provider.
    ///
    /// Resolves once the transport is open (or fails with
    /// [`RelayError::ConnectFailure`]); callers that must stay responsive
    /// while connecting run `open` in a spawned task.
    async fn open(
        &self,
        config: &UpstreamConfig,
        events: mpsc::Sender<UpstreamEvent>,
    ) -> RelayResult<UpstreamHandle>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_appends_model() {
        let config = UpstreamConfig {
            url: "wss://api.openai.com/v1/realtime".to_string(),
            api_key: "sk-test".to_string(),
            model: "gpt-4o-realtime-preview-2024-12-17".to_string(),
        };
        assert_eq!(
            config.endpoint(),
            "wss://api.openai.com/v1/realtime?model=gpt-4o-realtime-preview-2024-12-17"
        );
    }

    #[test]
    fn test_error_display() {
        let err = RelayError::ConnectFailure("refused".to_string());
        assert!(err.to_string().contains("connection failed"));

        let err = RelayError::NotOpen;
        assert_eq!(err.to_string(), "upstream transport is not open");
    }

    #[tokio::test]
    async fn test_handle_send_fails_after_receiver_drops() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = UpstreamHandle::new(tx);
        let result = handle.send(RelayFrame::Text("hello".to_string())).await;
        assert!(matches!(result, Err(RelayError::NotOpen)));
    }
}
