use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::Local;
use serde::{Deserialize, Serialize};

use super::{load_json, write_json, StoreError};
use crate::models::{Conversation, ConversationMessage};

#[derive(Debug, Default, Serialize, Deserialize)]
struct ConversationsFile {
    #[serde(default)]
    conversations: Vec<Conversation>,
}

/// Chat history per conversation id, persisted to `conversations.json` with
/// the same replace-on-write discipline as the clinic snapshot.
pub struct ConversationLog {
    path: PathBuf,
    conversations: BTreeMap<String, Conversation>,
}

impl ConversationLog {
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = data_dir.into().join("conversations.json");
        let file: ConversationsFile = load_json(&path)?.unwrap_or_default();
        let conversations = file
            .conversations
            .into_iter()
            .filter(|c| !c.conversation_id.is_empty())
            .map(|c| (c.conversation_id.clone(), c))
            .collect();
        Ok(ConversationLog {
            path,
            conversations,
        })
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.get(id)
    }

    pub fn get_or_create(&mut self, id: &str) -> &mut Conversation {
        self.conversations
            .entry(id.to_string())
            .or_insert_with(|| Conversation {
                conversation_id: id.to_string(),
                patient_id: None,
                patient_name: None,
                awaiting_registration: false,
                messages: Vec::new(),
            })
    }

    pub fn conversations(&self) -> impl Iterator<Item = &Conversation> {
        self.conversations.values()
    }

    /// Append a user/assistant exchange and persist the log.
    pub fn record_exchange(
        &mut self,
        id: &str,
        user_text: &str,
        assistant_text: &str,
    ) -> Result<(), StoreError> {
        let now = Local::now().naive_local();
        let conv = self.get_or_create(id);
        conv.messages.push(ConversationMessage {
            role: "user".to_string(),
            content: user_text.to_string(),
            timestamp: now,
        });
        conv.messages.push(ConversationMessage {
            role: "assistant".to_string(),
            content: assistant_text.to_string(),
            timestamp: now,
        });
        self.save()
    }

    pub fn save(&self) -> Result<(), StoreError> {
        let file = ConversationsFile {
            conversations: self.conversations.values().cloned().collect(),
        };
        write_json(&self.path, &file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_with_no_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let log = ConversationLog::open(dir.path()).unwrap();
        assert_eq!(log.conversations().count(), 0);
    }

    #[test]
    fn test_record_exchange_round_trips_through_disk() {
        let dir = TempDir::new().unwrap();
        let mut log = ConversationLog::open(dir.path()).unwrap();
        log.get_or_create("conv_1").patient_name = Some("Alice Johnson".to_string());
        log.record_exchange("conv_1", "hi there", "hello, how can I help?")
            .unwrap();

        let reopened = ConversationLog::open(dir.path()).unwrap();
        let conv = reopened.get("conv_1").unwrap();
        assert_eq!(conv.patient_name.as_deref(), Some("Alice Johnson"));
        assert_eq!(conv.messages.len(), 2);
        assert_eq!(conv.messages[0].role, "user");
        assert_eq!(conv.messages[1].role, "assistant");
        assert_eq!(conv.messages[1].content, "hello, how can I help?");
    }

    #[test]
    fn test_entries_without_an_id_are_dropped_on_load() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("conversations.json"),
            r#"{"conversations":[{"conversation_id":"","messages":[]},{"conversation_id":"conv_2","messages":[]}]}"#,
        )
        .unwrap();
        let log = ConversationLog::open(dir.path()).unwrap();
        assert!(log.get("conv_2").is_some());
        assert_eq!(log.conversations().count(), 1);
    }
}
