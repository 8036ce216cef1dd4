//! Application state shared across handlers

use std::sync::Arc;

use auth::provider::storage::session_storage;
use auth::{AccessGuard, AuthController, AuthSettings, RestProfileClient, SessionStore, SupabaseAuthProvider};
use chat::{MessagePipeline, RestChatBackend};
use common::config::AppConfig;
use common::{RestClient, TransportResult};

use crate::owner::SessionOwner;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthController>,
    pub guard: AccessGuard,
    pub chat: Arc<MessagePipeline>,
    pub provider: RestClient,
    /// Browser allowed to act as the signed-in user
    pub owner: SessionOwner,
    /// Where to go after sign-in when no location was preserved
    pub post_login_redirect: String,
}

impl AppState {
    /// Wire the provider clients, stores and controllers from configuration
    pub fn from_config(config: &AppConfig) -> TransportResult<Self> {
        let client = RestClient::new(&config.provider)?;
        let store = SessionStore::new();

        let identity = Arc::new(SupabaseAuthProvider::new(
            client.clone(),
            session_storage(config.auth.session_file.as_deref()),
        ));
        let profiles = Arc::new(RestProfileClient::new(client.clone()));
        let auth = AuthController::new(
            identity,
            profiles.clone(),
            profiles,
            store.clone(),
            AuthSettings::from(&config.auth),
        );

        let chat = MessagePipeline::new(Arc::new(RestChatBackend::new(client.clone())), store.clone());

        Ok(Self {
            auth: Arc::new(auth),
            guard: AccessGuard::new(store, config.auth.sign_in_path.clone()),
            chat: Arc::new(chat),
            provider: client,
            owner: SessionOwner::new(),
            post_login_redirect: config.auth.post_login_redirect.clone(),
        })
    }
}
