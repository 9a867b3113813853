use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::Local;

use crate::state::AppState;

// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let llm_model = state
        .llm
        .as_ref()
        .map(|_| state.config.llm_model.clone());

    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Local::now().naive_local(),
        "llm_configured": state.llm.is_some(),
        "llm_model": llm_model,
    }))
}
