use axum::{
    Router,
    routing::post,
};
use tower_http::trace::TraceLayer;

use crate::handlers::{chat, session};
use crate::state::AppState;
use std::sync::Arc;

/// Create the REST API router.
///
/// # Endpoints
///
/// - `POST /session` - mint an ephemeral realtime token for browser clients
/// - `POST /chat/completions` - text-mode chat proxy
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/session", post(session::create_session))
        .route("/chat/completions", post(chat::chat_completions))
        .layer(TraceLayer::new_for_http())
}
