//! Chat completions proxy.
//!
//! Text-mode fallback for clients without audio: forwards a restricted
//! completion request under the server credential and relays the provider's
//! response, success or error, with its original status.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::errors::{AppError, AppResult};
use crate::state::AppState;

const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_MAX_TOKENS: u32 = 1000;
const DEFAULT_TEMPERATURE: f64 = 0.7;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<Value>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
}

/// POST /api/chat/completions
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> AppResult<Response> {
    if request.messages.is_empty() {
        return Err(AppError::BadRequest("messages must not be empty".to_string()));
    }

    let response = state
        .http()
        .post(state.chat_completions_url())
        .bearer_auth(&state.config().openai_api_key)
        .json(&json!({
            "model": request.model.unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            "messages": request.messages,
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "temperature": request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        }))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::UpstreamStatus { status, body });
    }

    let body: Value = response.json().await?;
    Ok((StatusCode::OK, Json(body)).into_response())
}
