//! Optimistic message pipeline
//!
//! Sending a message shows it right away, then reconciles with the
//! backend: the local record is replaced by the persisted one and the
//! assistant reply, or removed if the send fails.

use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use auth::{Session, SessionStore};
use common::Subscription;

use crate::backend::ChatBackend;
use crate::error::{ChatError, ChatResult};
use crate::log::TentativeMessage;
use crate::models::{
    derive_title, Conversation, Message, SendMessageResponse, SentMessages,
    DEFAULT_CONVERSATION_TITLE,
};
use crate::store::ConversationStore;

const MAX_TITLE_LENGTH: usize = 100;

/// Chat operations for the signed-in user
pub struct MessagePipeline {
    backend: Arc<dyn ChatBackend>,
    sessions: SessionStore,
    store: ConversationStore,
    background: Mutex<JoinSet<()>>,
    _session_watch: Subscription,
}

impl MessagePipeline {
    /// The conversation cache is emptied whenever the signed-in user changes
    pub fn new(backend: Arc<dyn ChatBackend>, sessions: SessionStore) -> Self {
        let store = ConversationStore::new();

        let watched = store.clone();
        let owner = Mutex::new(sessions.state().user_id());
        let session_watch = sessions.subscribe(move |state| {
            let mut owner = owner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let user_id = state.user_id();
            if *owner != user_id {
                debug!(previous = ?*owner, current = ?user_id, "Chat owner changed");
                *owner = user_id;
                watched.clear();
            }
        });

        Self {
            backend,
            sessions,
            store,
            background: Mutex::new(JoinSet::new()),
            _session_watch: session_watch,
        }
    }

    /// Read handle to the conversation cache
    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    fn session(&self) -> ChatResult<Session> {
        self.sessions
            .state()
            .session
            .filter(|session| !session.has_lapsed())
            .ok_or(ChatError::NotAuthenticated)
    }

    /// Whether `session`'s user is still the one signed in. Results fetched
    /// for someone else are dropped.
    fn still_signed_in(&self, session: &Session) -> bool {
        self.sessions.state().user_id() == Some(session.subject())
    }

    /// Fetch the user's conversations
    pub async fn load_conversations(&self) -> ChatResult<Vec<Conversation>> {
        let session = self.session()?;
        let conversations = self
            .backend
            .list_conversations(session.subject(), &session.access_token)
            .await?;
        if !self.still_signed_in(&session) {
            return Err(ChatError::NotAuthenticated);
        }
        self.store.set_conversations(conversations.clone());
        Ok(conversations)
    }

    /// Make a conversation current and fetch its messages
    pub async fn select_conversation(&self, conversation_id: Uuid) -> ChatResult<Vec<Message>> {
        let session = self.session()?;
        if self.store.conversation(conversation_id).is_none() {
            return Err(ChatError::ConversationNotFound(conversation_id));
        }

        let messages = self
            .backend
            .fetch_messages(conversation_id, &session.access_token)
            .await?;
        if !self.still_signed_in(&session) {
            return Err(ChatError::NotAuthenticated);
        }
        if !self.store.set_messages(conversation_id, messages) {
            return Err(ChatError::ConversationNotFound(conversation_id));
        }
        self.store.select(Some(conversation_id));
        Ok(self.store.messages(conversation_id))
    }

    /// Clear the selection; the next message starts a new conversation
    pub fn start_new_conversation(&self) {
        self.store.select(None);
    }

    /// Create an empty conversation and make it current
    pub async fn create_conversation(&self) -> ChatResult<Conversation> {
        let session = self.session()?;
        self.create_for(&session).await
    }

    async fn create_for(&self, session: &Session) -> ChatResult<Conversation> {
        let conversation = self
            .backend
            .create_conversation(
                session.subject(),
                DEFAULT_CONVERSATION_TITLE,
                &session.access_token,
            )
            .await?;
        info!(conversation_id = %conversation.id, "Conversation created");
        if !self.still_signed_in(session) {
            return Err(ChatError::NotAuthenticated);
        }

        self.store.insert_conversation(conversation.clone());
        self.store.select(Some(conversation.id));
        Ok(conversation)
    }

    pub async fn rename_conversation(
        &self,
        conversation_id: Uuid,
        title: &str,
    ) -> ChatResult<Conversation> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ChatError::Validation("Title is required".to_string()));
        }
        if title.chars().count() > MAX_TITLE_LENGTH {
            return Err(ChatError::Validation(format!(
                "Title must be at most {MAX_TITLE_LENGTH} characters long"
            )));
        }

        let session = self.session()?;
        let conversation = self
            .backend
            .update_title(conversation_id, title, &session.access_token)
            .await?;
        self.store.replace_conversation(conversation.clone());
        Ok(conversation)
    }

    pub async fn delete_conversation(&self, conversation_id: Uuid) -> ChatResult<()> {
        let session = self.session()?;
        self.backend
            .delete_conversation(conversation_id, &session.access_token)
            .await?;
        self.store.remove_conversation(conversation_id);
        Ok(())
    }

    /// Send a message to the current conversation, creating one first if
    /// none is selected
    #[instrument(skip(self, content))]
    pub async fn send_message(&self, content: &str) -> ChatResult<SentMessages> {
        let session = self.session()?;
        if content.trim().is_empty() {
            return Err(ChatError::Validation("Message cannot be empty".to_string()));
        }

        let conversation = match self.store.current_conversation() {
            Some(conversation) => conversation,
            None => self.create_for(&session).await?,
        };
        let conversation_id = conversation.id;

        let token = self.store.apply_tentative(TentativeMessage::new(
            conversation_id,
            session.subject(),
            content,
        ));
        debug!(%conversation_id, local_id = %token.local_id(), "Message applied locally");

        let outcome = self
            .backend
            .send_message(conversation_id, content, &session.access_token)
            .await;

        let (user_message, ai_message) = match outcome {
            Ok(SendMessageResponse {
                user_message: Some(user_message),
                ai_message: Some(ai_message),
            }) => (Message::from(user_message), Message::from(ai_message)),
            Ok(_) => {
                self.store.rollback(conversation_id, token);
                warn!(%conversation_id, "Chat backend answered without both messages");
                return Err(ChatError::MalformedResponse(
                    "response is missing the user or assistant message".to_string(),
                ));
            }
            Err(e) => {
                self.store.rollback(conversation_id, token);
                warn!(%conversation_id, "Message send failed: {}", e);
                return Err(e);
            }
        };

        let sent = SentMessages {
            user_message,
            ai_message,
        };
        if !self.still_signed_in(&session) {
            debug!(%conversation_id, "Signed out while sending, reply not cached");
            return Ok(sent);
        }

        self.store.commit(
            conversation_id,
            token,
            sent.user_message.clone(),
            sent.ai_message.clone(),
        );
        self.store.touch(conversation_id);

        if let Some(current) = self.store.conversation(conversation_id) {
            if current.has_default_title() {
                self.retitle(current, content, &session);
            }
        }

        Ok(sent)
    }

    /// Title a fresh conversation after its first message. Applied locally
    /// at once and persisted in the background.
    fn retitle(&self, mut conversation: Conversation, content: &str, session: &Session) {
        let title = derive_title(content);
        if title.is_empty() {
            return;
        }

        conversation.title = title.clone();
        self.store.replace_conversation(conversation.clone());

        let backend = Arc::clone(&self.backend);
        let store = self.store.clone();
        let access_token = session.access_token.clone();
        let conversation_id = conversation.id;

        let mut tasks = self.background_tasks();
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            match backend
                .update_title(conversation_id, &title, &access_token)
                .await
            {
                Ok(stored) => {
                    debug!(%conversation_id, "Derived title stored");
                    store.replace_conversation(stored);
                }
                Err(e) => warn!(%conversation_id, "Failed to store derived title: {}", e),
            }
        });
    }

    fn background_tasks(&self) -> std::sync::MutexGuard<'_, JoinSet<()>> {
        self.background
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Background tasks not yet reaped
    pub fn background_tasks_pending(&self) -> usize {
        self.background_tasks().len()
    }

    /// Wait for background work started by earlier sends
    pub async fn wait_for_background_tasks(&self) {
        let mut tasks = std::mem::take(&mut *self.background_tasks());
        while tasks.join_next().await.is_some() {}
    }
}
