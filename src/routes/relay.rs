//! Relay WebSocket route configuration.

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::relay_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the relay WebSocket router.
///
/// # Endpoint
///
/// `GET /realtime` - WebSocket upgrade for the realtime relay
///
/// # Protocol
///
/// After the upgrade, the client sends a `session.create` JSON message to
/// start an upstream session; that message is forwarded as the session's
/// first event. Binary frames carry audio and flow both ways unchanged.
/// When the provider ends a turn (close code 1000) the client socket stays
/// open and a new `session.create` starts the next session.
pub fn create_relay_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/realtime", get(relay_handler))
        .layer(TraceLayer::new_for_http())
}
