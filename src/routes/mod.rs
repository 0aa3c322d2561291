//! Route assembly.

mod api;
mod relay;

use std::sync::Arc;

use axum::{Router, routing::get};

use crate::handlers;
use crate::middleware::connection_limit_middleware;
use crate::state::AppState;

pub use api::create_api_router;
pub use relay::create_relay_router;

/// Assemble the full application router: public endpoints, the REST API
/// under `/api`, and the relay WebSocket with connection limits.
pub fn create_app(state: Arc<AppState>) -> Router {
    let relay_routes = create_relay_router().layer(axum::middleware::from_fn_with_state(
        state.clone(),
        connection_limit_middleware,
    ));

    Router::new()
        .route("/", get(handlers::api::root_handler))
        .route("/health", get(handlers::api::health_check))
        .nest("/api", create_api_router())
        .merge(relay_routes)
        .with_state(state)
}
