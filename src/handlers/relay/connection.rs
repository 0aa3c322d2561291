//! Per-client relay state machine.
//!
//! Each client WebSocket owns one [`RelayConnection`]. The upstream session
//! is opened lazily: nothing is dialed until the client sends a
//! `session.create` message, and that same message becomes the first frame
//! delivered upstream once the connection settles. The two legs have an
//! asymmetric lifecycle. A client disconnect tears the upstream session
//! down, but an upstream close never closes the client: the provider ends
//! every completed turn with close code 1000, and the client is expected
//! to start the next turn with a fresh `session.create` over the same
//! socket.
//!
//! State transitions:
//!
//! ```text
//! Idle --session.create--> Connecting --opened--> Active --closed--> Idle
//!                               |
//!                               +--open failed--> Idle
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::core::relay::{
    NORMAL_CLOSE_CODE, RelayFrame, UPSTREAM_CHANNEL_CAPACITY, UpstreamConfig, UpstreamConnector,
    UpstreamEvent, UpstreamHandle,
};
use crate::state::ConnectionRegistry;

use super::messages::{RelayErrorKind, error_frame};

/// Channel capacity for relay events delivered to the connection task.
pub const RELAY_EVENT_CAPACITY: usize = 1024;

/// Lifecycle phase of the upstream leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// No upstream session; waiting for `session.create`
    Idle,
    /// An upstream dial is in flight
    Connecting,
    /// The upstream session is open and frames flow both ways
    Active,
}

/// Events delivered to the connection task from its upstream open tasks.
///
/// Every event carries the generation it belongs to; events from a
/// superseded session are discarded.
#[derive(Debug)]
pub enum RelayEvent {
    Opened {
        generation: u64,
        handle: UpstreamHandle,
    },
    OpenFailed {
        generation: u64,
        error: String,
    },
    Upstream {
        generation: u64,
        event: UpstreamEvent,
    },
}

/// State machine bridging one client WebSocket to lazily-opened upstream
/// realtime sessions.
pub struct RelayConnection<C: UpstreamConnector> {
    id: Uuid,
    state: RelayState,
    upstream: Option<UpstreamHandle>,
    /// The `session.create` frame held back until the upstream settles.
    pending_init: Option<RelayFrame>,
    /// Incremented on every dial and on teardown; fences stale events.
    generation: u64,
    connector: Arc<C>,
    upstream_config: UpstreamConfig,
    settle_delay: Duration,
    events_tx: mpsc::Sender<RelayEvent>,
    client_tx: mpsc::Sender<RelayFrame>,
    registry: Arc<ConnectionRegistry>,
}

impl<C: UpstreamConnector> RelayConnection<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: Uuid,
        connector: Arc<C>,
        upstream_config: UpstreamConfig,
        settle_delay: Duration,
        events_tx: mpsc::Sender<RelayEvent>,
        client_tx: mpsc::Sender<RelayFrame>,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            id,
            state: RelayState::Idle,
            upstream: None,
            pending_init: None,
            generation: 0,
            connector,
            upstream_config,
            settle_delay,
            events_tx,
            client_tx,
            registry,
        }
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    /// Handle one frame received from the client.
    pub async fn on_client_frame(&mut self, frame: RelayFrame) {
        if frame.is_binary() {
            if self.state == RelayState::Active {
                self.forward_upstream(frame).await;
            } else {
                // Audio with no session to carry it; dropped, not an error.
                tracing::debug!(
                    connection_id = %self.id,
                    state = ?self.state,
                    "dropping binary frame without active session"
                );
            }
            return;
        }

        if frame.is_session_create() {
            self.on_session_create(frame).await;
            return;
        }

        match self.state {
            RelayState::Active => self.forward_upstream(frame).await,
            RelayState::Idle | RelayState::Connecting => {
                tracing::debug!(
                    connection_id = %self.id,
                    state = ?self.state,
                    message_type = frame.message_type().unwrap_or("<text>"),
                    "client message without active session"
                );
                self.send_error(
                    RelayErrorKind::ConnectionLost,
                    "No active session. Send session.create to begin.",
                )
                .await;
            }
        }
    }

    /// Handle one event from an upstream open task.
    pub async fn on_event(&mut self, event: RelayEvent) {
        match event {
            RelayEvent::Opened { generation, handle } => {
                self.on_upstream_opened(generation, handle).await;
            }
            RelayEvent::OpenFailed { generation, error } => {
                self.on_upstream_open_failed(generation, error).await;
            }
            RelayEvent::Upstream { generation, event } => {
                if generation != self.generation {
                    tracing::debug!(
                        connection_id = %self.id,
                        generation,
                        "discarding event from superseded session"
                    );
                    return;
                }
                match event {
                    UpstreamEvent::Frame(frame) => self.on_upstream_frame(frame).await,
                    UpstreamEvent::Closed { code, reason } => {
                        self.on_upstream_closed(code, reason).await;
                    }
                    UpstreamEvent::Error(message) => {
                        tracing::warn!(connection_id = %self.id, "upstream error: {message}");
                    }
                }
            }
        }
    }

    /// Release the upstream session when the client leg ends.
    pub fn teardown(&mut self) {
        // Bumping the generation fences any event still in flight.
        self.generation += 1;
        self.upstream = None;
        self.pending_init = None;
        self.state = RelayState::Idle;
        self.registry.clear_session(&self.id);
    }

    async fn on_session_create(&mut self, frame: RelayFrame) {
        match self.state {
            RelayState::Idle => {
                self.state = RelayState::Connecting;
                self.generation += 1;
                self.pending_init = Some(frame);
                tracing::info!(
                    connection_id = %self.id,
                    model = %self.upstream_config.model,
                    "opening upstream session"
                );
                self.spawn_open();
            }
            RelayState::Connecting => {
                tracing::debug!(
                    connection_id = %self.id,
                    "session already connecting, ignoring duplicate session.create"
                );
            }
            RelayState::Active => {
                // The provider treats a repeated session.create as an
                // in-session event; forward it like any other message.
                self.forward_upstream(frame).await;
            }
        }
    }

    fn spawn_open(&self) {
        let generation = self.generation;
        let connector = Arc::clone(&self.connector);
        let config = self.upstream_config.clone();
        let events = self.events_tx.clone();

        tokio::spawn(async move {
            let (up_tx, mut up_rx) = mpsc::channel(UPSTREAM_CHANNEL_CAPACITY);
            match connector.open(&config, up_tx).await {
                Ok(handle) => {
                    if events
                        .send(RelayEvent::Opened { generation, handle })
                        .await
                        .is_err()
                    {
                        return;
                    }
                    while let Some(event) = up_rx.recv().await {
                        let closed = matches!(event, UpstreamEvent::Closed { .. });
                        if events
                            .send(RelayEvent::Upstream { generation, event })
                            .await
                            .is_err()
                        {
                            return;
                        }
                        if closed {
                            return;
                        }
                    }
                }
                Err(e) => {
                    let _ = events
                        .send(RelayEvent::OpenFailed {
                            generation,
                            error: e.to_string(),
                        })
                        .await;
                }
            }
        });
    }

    async fn on_upstream_opened(&mut self, generation: u64, handle: UpstreamHandle) {
        if generation != self.generation {
            tracing::debug!(
                connection_id = %self.id,
                generation,
                "discarding open result from superseded session"
            );
            return;
        }

        self.state = RelayState::Active;
        self.upstream = Some(handle);
        self.registry.set_session(&self.id);
        tracing::info!(connection_id = %self.id, "upstream session active");

        // Give the freshly-opened socket a moment before the first frame;
        // the provider drops events sent in the same instant it opens.
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }

        if let Some(init) = self.pending_init.take() {
            let send_result = match &self.upstream {
                Some(handle) => handle.send(init).await,
                None => return,
            };
            if let Err(e) = send_result {
                tracing::error!(connection_id = %self.id, "failed to deliver session init: {e}");
                self.send_error(
                    RelayErrorKind::SessionInitError,
                    "Failed to initialize session",
                )
                .await;
            }
        }
    }

    async fn on_upstream_open_failed(&mut self, generation: u64, error: String) {
        if generation != self.generation {
            return;
        }
        tracing::error!(connection_id = %self.id, "upstream connection failed: {error}");
        self.state = RelayState::Idle;
        self.pending_init = None;
        self.send_error(
            RelayErrorKind::ConnectionError,
            "Failed to connect to realtime service",
        )
        .await;
    }

    async fn on_upstream_frame(&mut self, frame: RelayFrame) {
        if self.client_tx.send(frame).await.is_err() {
            tracing::debug!(connection_id = %self.id, "client channel closed, dropping frame");
        }
    }

    async fn on_upstream_closed(&mut self, code: u16, reason: String) {
        if code == NORMAL_CLOSE_CODE {
            // End of turn. The client keeps its socket and may start a new
            // session with another session.create.
            tracing::info!(connection_id = %self.id, "upstream session closed normally");
        } else {
            tracing::warn!(
                connection_id = %self.id,
                code,
                reason = %reason,
                "upstream session closed unexpectedly"
            );
            self.send_error(
                RelayErrorKind::ConnectionError,
                format!("Realtime session ended unexpectedly (code {code})"),
            )
            .await;
        }

        self.upstream = None;
        self.pending_init = None;
        self.state = RelayState::Idle;
        self.registry.clear_session(&self.id);
    }

    async fn forward_upstream(&mut self, frame: RelayFrame) {
        let Some(handle) = &self.upstream else {
            self.send_error(
                RelayErrorKind::ConnectionNotReady,
                "Realtime session is not ready",
            )
            .await;
            return;
        };
        if let Err(e) = handle.send(frame).await {
            tracing::warn!(connection_id = %self.id, "failed to forward frame upstream: {e}");
            self.send_error(RelayErrorKind::SendError, "Failed to forward message").await;
        }
    }

    async fn send_error(&self, kind: RelayErrorKind, message: impl Into<String>) {
        if self.client_tx.send(error_frame(kind, message)).await.is_err() {
            tracing::debug!(connection_id = %self.id, "client channel closed, dropping error");
        }
    }
}
