use std::sync::Mutex;

use crate::config::AppConfig;
use crate::services::ai::LlmProvider;
use crate::store::{ConversationLog, SnapshotStore};

/// Shared application state handed to every route handler. The clinic
/// snapshot and the conversation log sit behind separate locks; `llm` is
/// `None` when the LLM environment variables are incomplete.
pub struct AppState {
    pub store: Mutex<SnapshotStore>,
    pub conversations: Mutex<ConversationLog>,
    pub llm: Option<Box<dyn LlmProvider>>,
    pub config: AppConfig,
}
