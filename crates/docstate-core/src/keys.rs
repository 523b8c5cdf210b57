//! Document key derivation.
//!
//! Turns a [`StorageContext`] into the ids of the documents a load/save call
//! touches. Pure and stateless: absent ids or disabled flags shrink the key
//! set, they are never an error.

use docstate_types::context::StorageContext;
use docstate_types::data::StatePartition;

/// `user:{user_id}`
pub fn user_key(user_id: &str) -> String {
    format!("user:{user_id}")
}

/// `conversation:{conversation_id}`
pub fn conversation_key(conversation_id: &str) -> String {
    format!("conversation:{conversation_id}")
}

/// `conversation:{conversation_id};user:{user_id}`
pub fn private_conversation_key(conversation_id: &str, user_id: &str) -> String {
    format!("conversation:{conversation_id};user:{user_id}")
}

/// One derived document id and the partition it stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentKey {
    pub partition: StatePartition,
    pub id: String,
}

/// The documents applicable to one context, at most one per partition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageKeys {
    keys: Vec<DocumentKey>,
}

impl StorageKeys {
    pub fn get(&self, partition: StatePartition) -> Option<&str> {
        self.keys
            .iter()
            .find(|k| k.partition == partition)
            .map(|k| k.id.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &DocumentKey> {
        self.keys.iter()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl IntoIterator for StorageKeys {
    type Item = DocumentKey;
    type IntoIter = std::vec::IntoIter<DocumentKey>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.into_iter()
    }
}

/// Derive the document keys for a context.
///
/// - `userData` iff a user id is present and user data is persisted.
/// - `privateConversationData` iff both ids are present; the persistence
///   flags do not gate it.
/// - `conversationData` iff a conversation id is present and conversation
///   data is persisted.
pub fn derive_keys(context: &StorageContext) -> StorageKeys {
    let user_id = context.user_id.as_deref();
    let conversation_id = context.conversation_id.as_deref();
    let mut keys = Vec::with_capacity(3);

    if let (Some(user_id), true) = (user_id, context.persist_user_data) {
        keys.push(DocumentKey {
            partition: StatePartition::UserData,
            id: user_key(user_id),
        });
    }

    if let (Some(user_id), Some(conversation_id)) = (user_id, conversation_id) {
        keys.push(DocumentKey {
            partition: StatePartition::PrivateConversationData,
            id: private_conversation_key(conversation_id, user_id),
        });
    }

    if let (Some(conversation_id), true) = (conversation_id, context.persist_conversation_data) {
        keys.push(DocumentKey {
            partition: StatePartition::ConversationData,
            id: conversation_key(conversation_id),
        });
    }

    StorageKeys { keys }
}
