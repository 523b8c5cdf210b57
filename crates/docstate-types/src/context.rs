//! Storage context supplied by the bot host on every load/save.

use serde::{Deserialize, Serialize};

/// Identifies whose state a load/save call touches and which partitions the
/// host wants persisted.
///
/// Immutable per call. A missing `user_id` or `conversation_id` suppresses
/// every document key that depends on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub persist_user_data: bool,
    #[serde(default)]
    pub persist_conversation_data: bool,
}

impl StorageContext {
    /// Context for a user in a conversation with both persistence flags on.
    pub fn new(user_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            conversation_id: Some(conversation_id.into()),
            persist_user_data: true,
            persist_conversation_data: true,
        }
    }

    pub fn with_persist_user_data(mut self, persist: bool) -> Self {
        self.persist_user_data = persist;
        self
    }

    pub fn with_persist_conversation_data(mut self, persist: bool) -> Self {
        self.persist_conversation_data = persist;
        self
    }

    pub fn without_user(mut self) -> Self {
        self.user_id = None;
        self
    }

    pub fn without_conversation(mut self) -> Self {
        self.conversation_id = None;
        self
    }
}
