use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{CreateSessionResponse, SessionStatus};
use crate::session::GREETING;
use crate::state::AppState;

/// POST /api/sessions - Start a session and return its greeting
pub async fn create_session(
    State(state): State<AppState>,
) -> (StatusCode, Json<CreateSessionResponse>) {
    let id = state.create_session();
    (
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            id,
            greeting: GREETING.to_string(),
        }),
    )
}

/// GET /api/sessions/:id - What the session has loaded
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionStatus>, (StatusCode, String)> {
    let session = state
        .session(&id)
        .ok_or((StatusCode::NOT_FOUND, "Session not found".to_string()))?;
    // Waits while a message is being handled.
    let status = session.lock().await.status();
    Ok(Json(status))
}

/// DELETE /api/sessions/:id
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    if state.remove_session(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, "Session not found".to_string()))
    }
}

/// GET /api/config - Active LLM config (API key redacted)
pub async fn get_config(State(state): State<AppState>) -> Json<LlmConfigResponse> {
    let config = &state.config.llm;
    Json(LlmConfigResponse {
        provider: config.provider.clone(),
        base_url: config.base_url.clone(),
        chat_model: config.chat_model.clone(),
        embedding_model: config.embedding_model.clone(),
        temperature: config.temperature,
        has_api_key: config.api_key.is_some(),
    })
}

/// Config response with API key redacted
#[derive(Debug, Serialize)]
pub struct LlmConfigResponse {
    pub provider: String,
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub has_api_key: bool,
}
