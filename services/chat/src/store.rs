//! Conversation cache for the signed-in user
//!
//! Single writer ([`crate::MessagePipeline`]), many readers. Readers get
//! cloned snapshots; every mutation notifies subscribers before returning.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use common::{Listeners, Subscription};

use crate::log::{MessageLog, PendingToken, TentativeMessage};
use crate::models::{Conversation, Message};

/// What the chat view renders
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatSnapshot {
    /// Most recently active first
    pub conversations: Vec<Conversation>,
    pub current_conversation_id: Option<Uuid>,
    /// Messages of the current conversation
    pub messages: Vec<Message>,
}

#[derive(Default)]
struct ChatState {
    conversations: Vec<Conversation>,
    current: Option<Uuid>,
    logs: HashMap<Uuid, MessageLog>,
}

impl ChatState {
    fn snapshot(&self) -> ChatSnapshot {
        ChatSnapshot {
            conversations: self.conversations.clone(),
            current_conversation_id: self.current,
            messages: self
                .current
                .and_then(|id| self.logs.get(&id))
                .map(|log| log.messages().to_vec())
                .unwrap_or_default(),
        }
    }

    fn position(&self, conversation_id: Uuid) -> Option<usize> {
        self.conversations
            .iter()
            .position(|c| c.id == conversation_id)
    }
}

struct Inner {
    state: RwLock<ChatState>,
    listeners: Listeners<ChatSnapshot>,
    writes: Mutex<()>,
}

/// Shared handle to the conversation cache
#[derive(Clone)]
pub struct ConversationStore {
    inner: Arc<Inner>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(ChatState::default()),
                listeners: Listeners::new(),
                writes: Mutex::new(()),
            }),
        }
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        self.read().snapshot()
    }

    pub fn conversations(&self) -> Vec<Conversation> {
        self.read().conversations.clone()
    }

    pub fn conversation(&self, conversation_id: Uuid) -> Option<Conversation> {
        let state = self.read();
        state
            .position(conversation_id)
            .map(|index| state.conversations[index].clone())
    }

    pub fn current_conversation(&self) -> Option<Conversation> {
        let current = self.read().current?;
        self.conversation(current)
    }

    /// Cached messages of a conversation
    pub fn messages(&self, conversation_id: Uuid) -> Vec<Message> {
        self.read()
            .logs
            .get(&conversation_id)
            .map(|log| log.messages().to_vec())
            .unwrap_or_default()
    }

    /// Register a handler called with a fresh snapshot after every mutation
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ChatSnapshot) + Send + Sync + 'static,
    {
        self.inner.listeners.subscribe(handler)
    }

    fn read(&self) -> RwLockReadGuard<'_, ChatState> {
        self.inner
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ChatState> {
        self.inner
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.inner
            .writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn mutate<T, F>(&self, change: F) -> T
    where
        F: FnOnce(&mut ChatState) -> T,
    {
        let _order = self.lock_writes();
        let (result, snapshot) = {
            let mut state = self.write();
            let result = change(&mut state);
            (result, state.snapshot())
        };
        self.inner.listeners.emit(&snapshot);
        result
    }

    pub(crate) fn set_conversations(&self, conversations: Vec<Conversation>) {
        self.mutate(|state| {
            state
                .logs
                .retain(|id, _| conversations.iter().any(|c| c.id == *id));
            if let Some(current) = state.current {
                if !conversations.iter().any(|c| c.id == current) {
                    state.current = None;
                }
            }
            state.conversations = conversations;
        });
    }

    /// Put a new conversation at the top of the list with an empty log
    pub(crate) fn insert_conversation(&self, conversation: Conversation) {
        self.mutate(|state| {
            if let Some(index) = state.position(conversation.id) {
                state.conversations.remove(index);
            }
            state.logs.entry(conversation.id).or_default();
            state.conversations.insert(0, conversation);
        });
    }

    /// Replace a conversation in place, keeping list order
    pub(crate) fn replace_conversation(&self, conversation: Conversation) -> bool {
        self.mutate(|state| match state.position(conversation.id) {
            Some(index) => {
                state.conversations[index] = conversation;
                true
            }
            None => false,
        })
    }

    /// Move a conversation to the top and mark it updated now
    pub(crate) fn touch(&self, conversation_id: Uuid) {
        self.mutate(|state| {
            if let Some(index) = state.position(conversation_id) {
                let mut conversation = state.conversations.remove(index);
                conversation.updated_at = Utc::now();
                state.conversations.insert(0, conversation);
            }
        });
    }

    pub(crate) fn remove_conversation(&self, conversation_id: Uuid) -> Option<Conversation> {
        self.mutate(|state| {
            state.logs.remove(&conversation_id);
            if state.current == Some(conversation_id) {
                state.current = None;
            }
            state
                .position(conversation_id)
                .map(|index| state.conversations.remove(index))
        })
    }

    pub(crate) fn select(&self, conversation_id: Option<Uuid>) {
        self.mutate(|state| state.current = conversation_id);
    }

    /// Replace a conversation's messages, keeping sends still in flight.
    /// Messages for a conversation no longer cached are dropped.
    pub(crate) fn set_messages(&self, conversation_id: Uuid, messages: Vec<Message>) -> bool {
        self.mutate(|state| {
            if state.position(conversation_id).is_none() {
                return false;
            }
            let pending: Vec<Message> = state
                .logs
                .get(&conversation_id)
                .map(|log| {
                    log.messages()
                        .iter()
                        .filter(|m| m.id.is_local())
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();

            let mut messages = messages;
            messages.extend(pending);
            state.logs.insert(conversation_id, MessageLog::new(messages));
            true
        })
    }

    pub(crate) fn apply_tentative(&self, tentative: TentativeMessage) -> PendingToken {
        let conversation_id = tentative.conversation_id;
        self.mutate(|state| {
            state
                .logs
                .entry(conversation_id)
                .or_default()
                .apply(tentative)
        })
    }

    pub(crate) fn commit(
        &self,
        conversation_id: Uuid,
        token: PendingToken,
        persisted: Message,
        reply: Message,
    ) -> bool {
        self.mutate(|state| {
            if state.position(conversation_id).is_none() {
                return false;
            }
            state
                .logs
                .get_mut(&conversation_id)
                .is_some_and(|log| log.commit(token, persisted, reply))
        })
    }

    pub(crate) fn rollback(&self, conversation_id: Uuid, token: PendingToken) -> Option<Message> {
        self.mutate(|state| {
            state
                .logs
                .get_mut(&conversation_id)
                .and_then(|log| log.rollback(token))
        })
    }

    /// Forget everything, e.g. when the signed-in user changes
    pub(crate) fn clear(&self) {
        self.mutate(|state| *state = ChatState::default());
    }
}
