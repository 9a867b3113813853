use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::errors::AppError;
use crate::models::{ChatRequest, ChatResponse};
use crate::services::chat;
use crate::state::AppState;

// POST /chat
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let response = chat::process_message(&state, request).await?;
    Ok(Json(response))
}
