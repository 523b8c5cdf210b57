//! Bot state records exchanged on load/save.
//!
//! A [`StorageData`] holds up to three opaque JSON bodies, one per
//! [`StatePartition`]. The storage layer never inspects the bodies beyond
//! defaulting a missing one to an empty object before writing.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The three logical state partitions a bot persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatePartition {
    /// State scoped to a user across all conversations.
    UserData,
    /// State scoped to a conversation, shared by all its users.
    ConversationData,
    /// State scoped to one user within one conversation.
    PrivateConversationData,
}

impl StatePartition {
    pub const ALL: [StatePartition; 3] = [
        StatePartition::UserData,
        StatePartition::ConversationData,
        StatePartition::PrivateConversationData,
    ];

    /// Field name used in serialized state records.
    pub fn field_name(&self) -> &'static str {
        match self {
            StatePartition::UserData => "userData",
            StatePartition::ConversationData => "conversationData",
            StatePartition::PrivateConversationData => "privateConversationData",
        }
    }
}

impl fmt::Display for StatePartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

/// State bodies for the partitions touched by one load/save call.
///
/// On load, a partition is `Some` iff its key was derived for the context
/// (absent documents load as an empty object). On save, `None` bodies are
/// written as `{}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_conversation_data: Option<Value>,
}

impl StorageData {
    pub fn get(&self, partition: StatePartition) -> Option<&Value> {
        match partition {
            StatePartition::UserData => self.user_data.as_ref(),
            StatePartition::ConversationData => self.conversation_data.as_ref(),
            StatePartition::PrivateConversationData => self.private_conversation_data.as_ref(),
        }
    }

    pub fn set(&mut self, partition: StatePartition, body: Value) {
        let slot = match partition {
            StatePartition::UserData => &mut self.user_data,
            StatePartition::ConversationData => &mut self.conversation_data,
            StatePartition::PrivateConversationData => &mut self.private_conversation_data,
        };
        *slot = Some(body);
    }

    /// Body to write for a partition: the caller's value, or `{}` when absent.
    pub fn body_or_empty(&self, partition: StatePartition) -> Value {
        self.get(partition).cloned().unwrap_or_else(empty_body)
    }

    pub fn is_empty(&self) -> bool {
        StatePartition::ALL.iter().all(|p| self.get(*p).is_none())
    }
}

/// The default body for a document that has never been written.
pub fn empty_body() -> Value {
    Value::Object(serde_json::Map::new())
}
