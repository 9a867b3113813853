use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub conversation_id: String,
    pub patient_id: Option<String>,
    pub patient_name: Option<String>,
    #[serde(default)]
    pub awaiting_registration: bool,
    #[serde(default)]
    pub messages: Vec<ConversationMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: String,
    pub content: String,
    pub timestamp: NaiveDateTime,
}
