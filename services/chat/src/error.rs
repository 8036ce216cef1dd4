//! Chat error types.

use common::TransportError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChatError {
    /// The chat needs a signed-in user
    #[error("Sign in to use the chat")]
    NotAuthenticated,

    #[error("{0}")]
    Validation(String),

    /// The backend answered successfully but without the expected content
    #[error("Unexpected response from chat backend: {0}")]
    MalformedResponse(String),

    #[error("Conversation {0} not found")]
    ConversationNotFound(Uuid),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ChatError {
    pub fn is_transient(&self) -> bool {
        match self {
            ChatError::Transport(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Result type alias using ChatError.
pub type ChatResult<T> = Result<T, ChatError>;
