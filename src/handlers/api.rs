//! Service-level endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde_json::json;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::state::AppState;

/// Root banner.
pub async fn root_handler() -> Json<serde_json::Value> {
    Json(json!({
        "service": "air-gateway",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Liveness probe with connection counts.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let registry = state.registry();
    Json(json!({
        "status": "ok",
        "timestamp": OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
        "connections": {
            "websocket": registry.connection_count(),
            "active_sessions": registry.active_session_count(),
        },
    }))
}
