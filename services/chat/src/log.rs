//! Two-phase message log
//!
//! An optimistic send first [`apply`](MessageLog::apply)s a tentative
//! message under a fresh local id, then either
//! [`commit`](MessageLog::commit)s the persisted pair or
//! [`rollback`](MessageLog::rollback)s. Both are keyed by the local id, so
//! any number of sends can be in flight at once.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{LocalId, Message, MessageId, MessageRole};

/// User message about to be sent
#[derive(Debug, Clone)]
pub struct TentativeMessage {
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl TentativeMessage {
    pub fn new(conversation_id: Uuid, sender_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            conversation_id,
            sender_id,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Handle on an applied tentative message
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a pending message must be committed or rolled back"]
pub struct PendingToken {
    local_id: LocalId,
}

impl PendingToken {
    pub fn local_id(&self) -> LocalId {
        self.local_id
    }
}

/// Ordered messages of one conversation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageLog {
    messages: Vec<Message>,
}

impl MessageLog {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of messages still waiting for the backend
    pub fn pending(&self) -> usize {
        self.messages.iter().filter(|m| m.id.is_local()).count()
    }

    /// Append a tentative message under a new local id
    pub fn apply(&mut self, tentative: TentativeMessage) -> PendingToken {
        let local_id = LocalId::new();
        self.messages.push(Message {
            id: MessageId::Local(local_id),
            conversation_id: tentative.conversation_id,
            sender_id: Some(tentative.sender_id),
            content: tentative.content,
            role: MessageRole::User,
            created_at: tentative.created_at,
        });
        PendingToken { local_id }
    }

    /// Replace the tentative message with its persisted version, followed
    /// directly by the reply.
    ///
    /// Returns false when the tentative message is gone (the log was
    /// reloaded meanwhile); the pair is then appended unless already present.
    pub fn commit(&mut self, token: PendingToken, persisted: Message, reply: Message) -> bool {
        match self.position(token.local_id) {
            Some(index) => {
                self.messages[index] = persisted;
                self.messages.insert(index + 1, reply);
                true
            }
            None => {
                for message in [persisted, reply] {
                    if !self.messages.iter().any(|m| m.id == message.id) {
                        self.messages.push(message);
                    }
                }
                false
            }
        }
    }

    /// Remove the tentative message
    pub fn rollback(&mut self, token: PendingToken) -> Option<Message> {
        self.position(token.local_id)
            .map(|index| self.messages.remove(index))
    }

    fn position(&self, local_id: LocalId) -> Option<usize> {
        let id = MessageId::Local(local_id);
        self.messages.iter().position(|m| m.id == id)
    }
}
