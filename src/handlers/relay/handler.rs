//! WebSocket relay endpoint.
//!
//! Accepts the client upgrade, then drives a [`RelayConnection`] from two
//! sources: frames read off the client socket and events reported by the
//! upstream session. A dedicated sender task owns the write half of the
//! client socket so upstream traffic and relay-originated error frames
//! share one ordered path to the client.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::core::relay::{RealtimeConnector, RelayFrame};
use crate::middleware::ClientIp;
use crate::state::AppState;

use super::connection::{RELAY_EVENT_CAPACITY, RelayConnection};

/// Maximum WebSocket frame size (10 MB), matching the largest audio
/// buffers clients send in one frame.
const MAX_WS_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Maximum WebSocket message size after reassembly (10 MB).
const MAX_WS_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// GET handler that upgrades to the relay WebSocket.
pub async fn relay_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    client_ip: Option<axum::Extension<ClientIp>>,
) -> impl IntoResponse {
    let ip = client_ip.map(|ext| ext.0.0).unwrap_or_else(|| addr.ip());
    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_relay_socket(socket, state, ip))
}

async fn handle_relay_socket(socket: WebSocket, state: Arc<AppState>, ip: std::net::IpAddr) {
    let connection_id = Uuid::new_v4();
    let registry = state.registry();
    registry.register(connection_id);
    tracing::info!(%connection_id, client_ip = %ip, "relay client connected");

    let (mut ws_sink, mut ws_stream) = socket.split();

    // Sender task: single writer for everything bound for the client.
    let (client_tx, mut client_rx) = mpsc::channel::<RelayFrame>(RELAY_EVENT_CAPACITY);
    let sender_task = tokio::spawn(async move {
        while let Some(frame) = client_rx.recv().await {
            let message = match frame {
                RelayFrame::Binary(data) => Message::Binary(data),
                RelayFrame::Json(value) => match serde_json::to_string(&value) {
                    Ok(json) => Message::Text(json.into()),
                    Err(e) => {
                        tracing::error!(%connection_id, "failed to serialize client frame: {e}");
                        continue;
                    }
                },
                RelayFrame::Text(text) => Message::Text(text.into()),
            };
            if ws_sink.send(message).await.is_err() {
                break;
            }
        }
        let _ = ws_sink.close().await;
    });

    let (events_tx, mut events_rx) = mpsc::channel(RELAY_EVENT_CAPACITY);
    let mut connection = RelayConnection::new(
        connection_id,
        Arc::new(RealtimeConnector),
        state.upstream_config(),
        state.config().settle_delay(),
        events_tx,
        client_tx,
        registry.clone(),
    );

    loop {
        tokio::select! {
            incoming = ws_stream.next() => match incoming {
                Some(Ok(Message::Binary(data))) => {
                    connection.on_client_frame(RelayFrame::Binary(data)).await;
                }
                Some(Ok(Message::Text(text))) => {
                    connection.on_client_frame(RelayFrame::from_text(text.as_str())).await;
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) => {
                    tracing::info!(%connection_id, "relay client closed connection");
                    break;
                }
                Some(Err(e)) => {
                    tracing::warn!(%connection_id, "relay client socket error: {e}");
                    break;
                }
                None => break,
            },

            event = events_rx.recv() => match event {
                Some(event) => connection.on_event(event).await,
                // All senders dropped; unreachable while this task holds one,
                // kept for completeness.
                None => break,
            },
        }
    }

    connection.teardown();
    registry.deregister(&connection_id);
    state.release_connection(ip);
    sender_task.abort();
    tracing::info!(%connection_id, "relay client disconnected");
}
