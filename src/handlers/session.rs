//! Ephemeral realtime session minting.
//!
//! Browsers that connect to the provider directly (WebRTC) must never see
//! the server credential. This endpoint trades the server API key for a
//! short-lived client secret issued by the provider's sessions API.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::errors::{AppError, AppResult};
use crate::state::AppState;

const SESSION_INSTRUCTIONS: &str =
    "You are a helpful voice assistant. Keep responses concise and conversational.";

/// Optional overrides accepted from the client.
#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    pub model: Option<String>,
    pub voice: Option<String>,
}

/// Short-lived credentials handed back to the browser.
#[derive(Debug, Serialize)]
pub struct EphemeralSession {
    pub ephemeral_token: String,
    pub session_id: String,
    pub expires_at: Value,
}

/// POST /api/session
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    body: Option<Json<CreateSessionRequest>>,
) -> AppResult<Json<EphemeralSession>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let model = request
        .model
        .unwrap_or_else(|| state.config().realtime_model.clone());
    let voice = request.voice.unwrap_or_else(|| "alloy".to_string());

    let response = state
        .http()
        .post(state.sessions_url())
        .bearer_auth(&state.config().openai_api_key)
        .json(&json!({
            "model": model,
            "voice": voice,
            "modalities": ["text", "audio"],
            "instructions": SESSION_INSTRUCTIONS,
            "input_audio_format": "pcm16",
            "output_audio_format": "pcm16",
            "input_audio_transcription": { "model": "whisper-1" },
        }))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::UpstreamStatus { status, body });
    }

    let session: Value = response.json().await?;
    let token = session
        .pointer("/client_secret/value")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            AppError::Internal("session response missing client_secret".to_string())
        })?;
    let session_id = session
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default();

    tracing::info!(session_id, model = %model, "minted ephemeral realtime session");

    Ok(Json(EphemeralSession {
        ephemeral_token: token.to_string(),
        session_id: session_id.to_string(),
        expires_at: session
            .pointer("/client_secret/expires_at")
            .cloned()
            .unwrap_or(Value::Null),
    }))
}
