//! Conversation persistence and client-held ("local") conversations.

pub mod store;

pub use store::{ConversationStore, NewMessage, StoredConversation, StoredMessage};

/// Prefix of conversation ids the client keeps to itself. They never reach
/// the database.
pub const LOCAL_PREFIX: &str = "local-";

pub fn is_local_conversation(id: &str) -> bool {
    id.starts_with(LOCAL_PREFIX)
}

/// A fresh client-held conversation for callers who are not signed in.
pub fn local_conversation(title: Option<&str>) -> StoredConversation {
    let now = chrono::Utc::now();
    let timestamp = now.to_rfc3339();
    StoredConversation {
        id: format!("{LOCAL_PREFIX}{}", now.timestamp_millis()),
        title: title
            .filter(|title| !title.trim().is_empty())
            .unwrap_or(store::DEFAULT_TITLE)
            .to_string(),
        created_at: timestamp.clone(),
        updated_at: timestamp,
        messages: Vec::new(),
    }
}

/// The conversation title derived from its first user message.
pub fn title_from_message(text: &str) -> String {
    let title: String = text.trim().chars().take(50).collect();
    if title.is_empty() {
        store::DEFAULT_TITLE.to_string()
    } else {
        title
    }
}
