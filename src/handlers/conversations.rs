use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::NaiveDateTime;
use serde::Deserialize;

use crate::errors::AppError;
use crate::handlers::appointments::parse_filter_bound;
use crate::models::Conversation;
use crate::state::AppState;

// GET /conversation/:id
pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let conversations = state.conversations.lock().unwrap();
    match conversations.get(&conversation_id) {
        Some(conversation) => Ok(Json(serde_json::json!({
            "conversation_id": conversation.conversation_id,
            "messages": conversation.messages,
        }))),
        None => Err(AppError::NotFound("Conversation not found".to_string())),
    }
}

// GET /conversations
#[derive(Deserialize)]
pub struct ConversationsQuery {
    pub patient_id: Option<String>,
    pub patient_name: Option<String>,
    pub keyword: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConversationsQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let start = query
        .date_from
        .as_deref()
        .map(|raw| parse_filter_bound(raw, false))
        .transpose()?;
    let end = query
        .date_to
        .as_deref()
        .map(|raw| parse_filter_bound(raw, true))
        .transpose()?;

    let summaries = {
        let conversations = state.conversations.lock().unwrap();
        conversations
            .conversations()
            .filter(|conv| {
                query
                    .patient_id
                    .as_ref()
                    .map_or(true, |id| conv.patient_id.as_ref() == Some(id))
            })
            .filter(|conv| {
                query
                    .patient_name
                    .as_ref()
                    .map_or(true, |name| conv.patient_name.as_ref() == Some(name))
            })
            .filter(|conv| match &query.keyword {
                Some(keyword) => {
                    let keyword = keyword.to_lowercase();
                    conv.messages
                        .iter()
                        .any(|m| m.content.to_lowercase().contains(&keyword))
                }
                None => true,
            })
            .filter(|conv| in_date_window(conv, start, end))
            .map(|conv| {
                serde_json::json!({
                    "conversation_id": conv.conversation_id,
                    "patient_id": conv.patient_id,
                    "patient_name": conv.patient_name,
                    "message_count": conv.messages.len(),
                    "last_message_at": conv.messages.last().map(|m| m.timestamp),
                })
            })
            .collect::<Vec<_>>()
    };

    Ok(Json(serde_json::json!({ "conversations": summaries })))
}

/// A conversation matches a date window when any part of its message span
/// falls inside it. Conversations without messages always pass.
fn in_date_window(
    conv: &Conversation,
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
) -> bool {
    let (first, last) = match (conv.messages.first(), conv.messages.last()) {
        (Some(first), Some(last)) => (first.timestamp, last.timestamp),
        _ => return true,
    };
    if let Some(start) = start {
        if last < start {
            return false;
        }
    }
    if let Some(end) = end {
        if first > end {
            return false;
        }
    }
    true
}
