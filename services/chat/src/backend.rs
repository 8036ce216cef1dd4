//! Chat backend contract and its REST implementation
//!
//! Conversations and messages are rows behind the provider's REST gateway;
//! sending a message goes through the hosted `chat` function, which stores
//! the user message and returns it together with the assistant reply.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde_json::json;
use tracing::{debug, instrument};
use uuid::Uuid;

use common::RestClient;

use crate::error::{ChatError, ChatResult};
use crate::models::{Conversation, Message, MessageRecord, SendMessageResponse};

const CONVERSATIONS_TABLE: &str = "conversations";
const MESSAGES_TABLE: &str = "messages";
const CHAT_FUNCTION: &str = "chat";

/// Remote store for conversations and messages
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Conversations of `user_id`, most recently updated first
    async fn list_conversations(&self, user_id: Uuid, access_token: &str)
        -> ChatResult<Vec<Conversation>>;

    /// Messages of a conversation in creation order
    async fn fetch_messages(&self, conversation_id: Uuid, access_token: &str)
        -> ChatResult<Vec<Message>>;

    async fn create_conversation(
        &self,
        user_id: Uuid,
        title: &str,
        access_token: &str,
    ) -> ChatResult<Conversation>;

    async fn update_title(
        &self,
        conversation_id: Uuid,
        title: &str,
        access_token: &str,
    ) -> ChatResult<Conversation>;

    /// Store a user message and produce the assistant reply
    async fn send_message(
        &self,
        conversation_id: Uuid,
        content: &str,
        access_token: &str,
    ) -> ChatResult<SendMessageResponse>;

    /// Delete a conversation together with its messages
    async fn delete_conversation(&self, conversation_id: Uuid, access_token: &str)
        -> ChatResult<()>;
}

/// Chat backend over the provider's REST gateway
#[derive(Clone)]
pub struct RestChatBackend {
    client: RestClient,
}

impl RestChatBackend {
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }

    fn conversation_url(&self, conversation_id: Uuid) -> String {
        format!(
            "{}?id=eq.{}",
            self.client.rest_url(CONVERSATIONS_TABLE),
            conversation_id
        )
    }
}

#[async_trait]
impl ChatBackend for RestChatBackend {
    #[instrument(skip(self, access_token))]
    async fn list_conversations(
        &self,
        user_id: Uuid,
        access_token: &str,
    ) -> ChatResult<Vec<Conversation>> {
        let url = format!(
            "{}?user_id=eq.{}&select=*&order=updated_at.desc",
            self.client.rest_url(CONVERSATIONS_TABLE),
            user_id
        );
        let request = self.client.request(Method::GET, &url, Some(access_token));
        Ok(self.client.send_json(request).await?)
    }

    #[instrument(skip(self, access_token))]
    async fn fetch_messages(
        &self,
        conversation_id: Uuid,
        access_token: &str,
    ) -> ChatResult<Vec<Message>> {
        let url = format!(
            "{}?conversation_id=eq.{}&select=*&order=created_at.asc",
            self.client.rest_url(MESSAGES_TABLE),
            conversation_id
        );
        let request = self.client.request(Method::GET, &url, Some(access_token));
        let rows: Vec<MessageRecord> = self.client.send_json(request).await?;
        Ok(rows.into_iter().map(Message::from).collect())
    }

    #[instrument(skip(self, access_token))]
    async fn create_conversation(
        &self,
        user_id: Uuid,
        title: &str,
        access_token: &str,
    ) -> ChatResult<Conversation> {
        let url = self.client.rest_url(CONVERSATIONS_TABLE);
        let request = self
            .client
            .request(Method::POST, &url, Some(access_token))
            .header("Prefer", "return=representation")
            .json(&json!([{ "user_id": user_id, "title": title }]));

        let rows: Vec<Conversation> = self.client.send_json(request).await?;
        rows.into_iter().next().ok_or_else(|| {
            ChatError::MalformedResponse("conversation was not returned".to_string())
        })
    }

    #[instrument(skip(self, access_token))]
    async fn update_title(
        &self,
        conversation_id: Uuid,
        title: &str,
        access_token: &str,
    ) -> ChatResult<Conversation> {
        let request = self
            .client
            .request(
                Method::PATCH,
                &self.conversation_url(conversation_id),
                Some(access_token),
            )
            .header("Prefer", "return=representation")
            .json(&json!({ "title": title, "updated_at": Utc::now() }));

        let rows: Vec<Conversation> = self.client.send_json(request).await?;
        rows.into_iter()
            .next()
            .ok_or(ChatError::ConversationNotFound(conversation_id))
    }

    #[instrument(skip(self, content, access_token))]
    async fn send_message(
        &self,
        conversation_id: Uuid,
        content: &str,
        access_token: &str,
    ) -> ChatResult<SendMessageResponse> {
        let url = self.client.functions_url(CHAT_FUNCTION);
        let request = self
            .client
            .request(Method::POST, &url, Some(access_token))
            .json(&json!({ "conversation_id": conversation_id, "message": content }));

        Ok(self.client.send_json(request).await?)
    }

    #[instrument(skip(self, access_token))]
    async fn delete_conversation(
        &self,
        conversation_id: Uuid,
        access_token: &str,
    ) -> ChatResult<()> {
        let messages_url = format!(
            "{}?conversation_id=eq.{}",
            self.client.rest_url(MESSAGES_TABLE),
            conversation_id
        );
        self.client
            .send_empty(
                self.client
                    .request(Method::DELETE, &messages_url, Some(access_token)),
            )
            .await?;

        self.client
            .send_empty(self.client.request(
                Method::DELETE,
                &self.conversation_url(conversation_id),
                Some(access_token),
            ))
            .await?;

        debug!(%conversation_id, "Conversation deleted");
        Ok(())
    }
}
