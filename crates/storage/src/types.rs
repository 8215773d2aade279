use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::ids::{ConversationId, IdentityId, MessageId};

/// Title every conversation starts with until the first user message lands.
pub const PLACEHOLDER_CONVERSATION_TITLE: &str = "New Chat";

/// Storage-local message role, intentionally decoupled from the wire-layer role enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub id: IdentityId,
    pub email: String,
    pub name: String,
}

impl IdentityRecord {
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: IdentityId::new_v7(),
            email: email.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: MessageId,
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub timestamp_unix_ms: u64,
}

/// Draft of a message before the store mints its id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub role: MessageRole,
    pub content: String,
    pub reasoning: Option<String>,
}

impl NewMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            reasoning: None,
        }
    }

    pub fn assistant(content: impl Into<String>, reasoning: Option<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            reasoning,
        }
    }
}

impl MessageRecord {
    pub fn from_draft(draft: NewMessage) -> Self {
        Self {
            id: MessageId::new_v7(),
            role: draft.role,
            content: draft.content,
            reasoning: draft.reasoning,
            timestamp_unix_ms: current_unix_timestamp_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: ConversationId,
    pub title: String,
    pub messages: Vec<MessageRecord>,
    pub created_at_unix_ms: u64,
}

impl ConversationRecord {
    pub fn new_empty() -> Self {
        Self {
            id: ConversationId::new_v7(),
            title: PLACEHOLDER_CONVERSATION_TITLE.to_string(),
            messages: Vec::new(),
            created_at_unix_ms: current_unix_timestamp_ms(),
        }
    }

    pub fn has_placeholder_title(&self) -> bool {
        self.title == PLACEHOLDER_CONVERSATION_TITLE
    }
}

/// Marker type for the identity blob scope, to keep trait signatures self-describing.
pub type ConversationCollection = Vec<ConversationRecord>;

pub fn current_unix_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_draft_keeps_role_content_and_reasoning() {
        let record = MessageRecord::from_draft(NewMessage::assistant(
            "final answer",
            Some("chain of thought".to_string()),
        ));

        assert_eq!(record.role, MessageRole::Assistant);
        assert_eq!(record.content, "final answer");
        assert_eq!(record.reasoning.as_deref(), Some("chain of thought"));
        assert!(record.timestamp_unix_ms > 0);
    }

    #[test]
    fn reasoning_is_omitted_from_serialized_form_when_absent() {
        let record = MessageRecord::from_draft(NewMessage::user("hello"));
        let serialized = serde_json::to_string(&record).unwrap();

        assert!(!serialized.contains("reasoning"));
        assert!(serialized.contains("\"role\":\"user\""));
    }

    #[test]
    fn new_conversation_starts_with_placeholder_title() {
        let conversation = ConversationRecord::new_empty();

        assert!(conversation.has_placeholder_title());
        assert!(conversation.messages.is_empty());
    }
}
