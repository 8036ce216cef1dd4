//! Membership chat
//!
//! Conversation cache plus the optimistic send pipeline. Every operation
//! runs on behalf of the user signed in through [`auth::SessionStore`].

pub mod backend;
pub mod error;
pub mod log;
pub mod models;
pub mod pipeline;
pub mod store;

pub use backend::{ChatBackend, RestChatBackend};
pub use error::{ChatError, ChatResult};
pub use log::{MessageLog, PendingToken, TentativeMessage};
pub use models::{
    derive_title, Conversation, LocalId, Message, MessageId, MessageRole, SentMessages,
    DEFAULT_CONVERSATION_TITLE,
};
pub use pipeline::MessagePipeline;
pub use store::{ChatSnapshot, ConversationStore};
