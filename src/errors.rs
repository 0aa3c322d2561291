//! HTTP error handling.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Errors returned by the HTTP API handlers.
#[derive(Debug, Error)]
pub enum AppError {
    /// The request body failed validation
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The upstream HTTP call failed at the transport level
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    /// The upstream answered with a non-success status
    #[error("upstream returned status {status}")]
    UpstreamStatus { status: StatusCode, body: String },

    /// An internal failure
    #[error("internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Invalid request", "message": message }),
            ),
            AppError::Upstream(e) => {
                tracing::error!("upstream request failed: {e}");
                (
                    StatusCode::BAD_GATEWAY,
                    json!({ "error": "Upstream request failed" }),
                )
            }
            AppError::UpstreamStatus { status, body } => {
                tracing::error!(status = %status, "upstream returned error: {body}");
                // Relay the provider's status so clients see the real cause.
                let details = serde_json::from_str::<serde_json::Value>(&body)
                    .unwrap_or_else(|_| json!(body));
                (status, json!({ "error": "Upstream error", "details": details }))
            }
            AppError::Internal(message) => {
                tracing::error!("internal error: {message}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
