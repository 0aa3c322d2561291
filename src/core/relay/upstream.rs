//! OpenAI Realtime API upstream connector.
//!
//! Opens one outbound WebSocket per session, authenticated with a bearer
//! credential and the `OpenAI-Beta: realtime=v1` marker. A spawned pump
//! task owns the socket: outbound frames arrive over an mpsc channel,
//! inbound frames are classified and delivered as [`UpstreamEvent`]s.
//!
//! # API Reference
//!
//! - Endpoint: `wss://api.openai.com/v1/realtime?model=<model>`
//! - Protocol: JSON control events as text frames, audio as binary frames
//! - The provider closes with code 1000 after each completed turn
//!
//! The connector performs no retry; the owning connection handler decides
//! when a new session is opened.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use http::HeaderValue;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;

use super::base::{
    ABNORMAL_CLOSE_CODE, NORMAL_CLOSE_CODE, RelayError, RelayResult, UPSTREAM_CHANNEL_CAPACITY,
    UpstreamConfig, UpstreamConnector, UpstreamEvent, UpstreamHandle,
};
use super::frame::RelayFrame;

/// OpenAI Realtime API WebSocket endpoint.
pub const OPENAI_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";

/// Provider-version header required by the Realtime API.
const OPENAI_BETA_HEADER: &str = "OpenAI-Beta";
const OPENAI_BETA_VALUE: &str = "realtime=v1";

/// Connector that opens sessions against the OpenAI Realtime API.
pub struct RealtimeConnector;

#[async_trait]
impl UpstreamConnector for RealtimeConnector {
    async fn open(
        &self,
        config: &UpstreamConfig,
        events: mpsc::Sender<UpstreamEvent>,
    ) -> RelayResult<UpstreamHandle> {
        let mut request = config
            .endpoint()
            .into_client_request()
            .map_err(|e| RelayError::ConnectFailure(e.to_string()))?;

        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|e| RelayError::ConnectFailure(e.to_string()))?;
        request.headers_mut().insert(http::header::AUTHORIZATION, bearer);
        request.headers_mut().insert(
            OPENAI_BETA_HEADER,
            HeaderValue::from_static(OPENAI_BETA_VALUE),
        );

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| RelayError::ConnectFailure(e.to_string()))?;

        tracing::info!(model = %config.model, "connected to realtime upstream");

        let (mut sink, mut stream) = ws_stream.split();
        let (tx, mut rx) = mpsc::channel::<RelayFrame>(UPSTREAM_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    outgoing = rx.recv() => match outgoing {
                        Some(frame) => {
                            let message = match frame_to_message(frame) {
                                Ok(message) => message,
                                Err(e) => {
                                    tracing::error!("failed to serialize upstream frame: {e}");
                                    continue;
                                }
                            };
                            if let Err(e) = sink.send(message).await {
                                let _ = events
                                    .send(UpstreamEvent::Error(e.to_string()))
                                    .await;
                                break;
                            }
                        }
                        // The owning handler dropped its handle; close in turn.
                        None => {
                            let _ = sink.send(Message::Close(None)).await;
                            break;
                        }
                    },

                    incoming = stream.next() => match incoming {
                        Some(Ok(Message::Binary(data))) => {
                            let _ = events
                                .send(UpstreamEvent::Frame(RelayFrame::Binary(data)))
                                .await;
                        }
                        Some(Ok(Message::Text(text))) => {
                            let _ = events
                                .send(UpstreamEvent::Frame(RelayFrame::from_text(text.as_str())))
                                .await;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (u16::from(f.code), f.reason.to_string()))
                                .unwrap_or((NORMAL_CLOSE_CODE, String::new()));
                            let _ = events.send(UpstreamEvent::Closed { code, reason }).await;
                            return;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = sink.send(Message::Pong(data)).await {
                                tracing::error!("failed to send pong upstream: {e}");
                            }
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            let _ = events.send(UpstreamEvent::Error(e.to_string())).await;
                            break;
                        }
                        None => break,
                    },
                }
            }

            // Transport ended without a close frame from the provider.
            let _ = events
                .send(UpstreamEvent::Closed {
                    code: ABNORMAL_CLOSE_CODE,
                    reason: String::new(),
                })
                .await;
        });

        Ok(UpstreamHandle::new(tx))
    }
}

/// Serialize a relay frame for the wire, preserving the binary/text
/// distinction.
fn frame_to_message(frame: RelayFrame) -> RelayResult<Message> {
    match frame {
        RelayFrame::Binary(data) => Ok(Message::Binary(data)),
        RelayFrame::Json(value) => {
            let json = serde_json::to_string(&value)
                .map_err(|e| RelayError::Serialization(e.to_string()))?;
            Ok(Message::Text(json.into()))
        }
        RelayFrame::Text(text) => Ok(Message::Text(text.into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serde_json::json;

    #[test]
    fn test_binary_frame_sent_with_binary_flag() {
        let message = frame_to_message(RelayFrame::Binary(Bytes::from(vec![1u8, 2, 3]))).unwrap();
        assert!(matches!(message, Message::Binary(_)));
    }

    #[test]
    fn test_json_frame_serialized_as_text() {
        let message =
            frame_to_message(RelayFrame::Json(json!({"type": "session.create"}))).unwrap();
        match message {
            Message::Text(text) => {
                assert_eq!(text.as_str(), r#"{"type":"session.create"}"#);
            }
            _ => panic!("Expected Text message"),
        }
    }

    #[test]
    fn test_plain_text_frame_passes_through() {
        let message = frame_to_message(RelayFrame::Text("hello".to_string())).unwrap();
        match message {
            Message::Text(text) => assert_eq!(text.as_str(), "hello"),
            _ => panic!("Expected Text message"),
        }
    }

    #[tokio::test]
    async fn test_open_rejects_unreachable_endpoint() {
        let config = UpstreamConfig {
            // Reserved TEST-NET address; the connection attempt fails fast.
            url: "ws://192.0.2.1:9".to_string(),
            api_key: "sk-test".to_string(),
            model: "gpt-4o-realtime-preview".to_string(),
        };
        let (events_tx, _events_rx) = mpsc::channel(8);
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            RealtimeConnector.open(&config, events_tx),
        )
        .await;
        // Either the connect fails or the timeout fires; it must not succeed.
        if let Ok(opened) = result {
            assert!(matches!(opened, Err(RelayError::ConnectFailure(_))));
        }
    }
}
