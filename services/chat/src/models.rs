//! Conversation and message models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Title every conversation starts with until one is derived or set
pub const DEFAULT_CONVERSATION_TITLE: &str = "New Conversation";

/// Derived titles keep this many characters of the first message
const DERIVED_TITLE_LENGTH: usize = 30;

/// Chat conversation owned by one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn has_default_title(&self) -> bool {
        self.title == DEFAULT_CONVERSATION_TITLE
    }
}

/// Title derived from a conversation's first message
pub fn derive_title(content: &str) -> String {
    let content = content.trim();
    if content.chars().count() > DERIVED_TITLE_LENGTH {
        let head: String = content.chars().take(DERIVED_TITLE_LENGTH).collect();
        format!("{}...", head)
    } else {
        content.to_string()
    }
}

/// Client-synthesized id of a message not yet confirmed by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalId(Uuid);

impl LocalId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LocalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "local-{}", self.0)
    }
}

/// Message id: server-issued once persisted, local before that.
///
/// The two kinds never compare equal, so a local id cannot collide with a
/// server id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MessageId {
    Persisted(Uuid),
    Local(LocalId),
}

impl MessageId {
    pub fn is_local(&self) -> bool {
        matches!(self, MessageId::Local(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// Chat message; `sender_id` is `None` for assistant replies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub content: String,
    pub role: MessageRole,
    pub created_at: DateTime<Utc>,
}

/// Message row as stored by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: Uuid,
    pub conversation_id: Uuid,
    #[serde(default)]
    pub sender_id: Option<Uuid>,
    pub content: String,
    pub role: MessageRole,
    pub created_at: DateTime<Utc>,
}

impl From<MessageRecord> for Message {
    fn from(record: MessageRecord) -> Self {
        Self {
            id: MessageId::Persisted(record.id),
            conversation_id: record.conversation_id,
            sender_id: record.sender_id,
            content: record.content,
            role: record.role,
            created_at: record.created_at,
        }
    }
}

/// Answer of the chat function: the persisted user message and the
/// assistant reply. Either may be missing in a malformed answer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendMessageResponse {
    #[serde(default, alias = "userMessage")]
    pub user_message: Option<MessageRecord>,
    #[serde(default, alias = "aiMessage")]
    pub ai_message: Option<MessageRecord>,
}

/// Messages stored by a successful send
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentMessages {
    pub user_message: Message,
    pub ai_message: Message,
}
