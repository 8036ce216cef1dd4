//! Identity provider contract
//!
//! The provider is an external collaborator: every call is an opaque async
//! remote operation. Session changes are pushed to handlers registered with
//! [`IdentityProvider::on_auth_state_change`]; the returned
//! [`Subscription`] unregisters the handler when released.

use async_trait::async_trait;
use common::Subscription;
use serde::{Deserialize, Serialize};

use crate::error::AuthResult;
use crate::models::{Session, UserIdentity, UserMetadata};
use crate::oauth::{OAuthProvider, OAuthStart};

pub mod storage;
pub mod supabase;

pub use storage::{FileSessionStorage, MemorySessionStorage, SessionStorage};
pub use supabase::SupabaseAuthProvider;

/// Kind of session change pushed by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthChangeEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

/// Session change notification; `session` is the new session, if any
#[derive(Debug, Clone, PartialEq)]
pub struct AuthChange {
    pub event: AuthChangeEvent,
    pub session: Option<Session>,
}

/// Handler registered for session change notifications
pub type AuthChangeHandler = Box<dyn Fn(&AuthChange) + Send + Sync>;

/// Registration request sent to the provider
#[derive(Clone, Serialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

/// Result of registering an identity.
///
/// `session` is only present when the provider signs the user in right
/// away (no email confirmation step).
#[derive(Debug, Clone)]
pub struct SignUpOutcome {
    pub user: UserIdentity,
    pub session: Option<Session>,
}

/// Attributes that can be changed on the signed-in identity
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<UserMetadata>,
}

/// Hosted identity provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create an identity
    async fn sign_up(&self, request: &SignUpRequest) -> AuthResult<SignUpOutcome>;

    /// Authenticate with email and password; rejected credentials yield
    /// `AuthError::Unauthorized` with the provider's message
    async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<Session>;

    /// Start a social sign-in; the browser must be sent to the returned URL
    async fn sign_in_with_oauth(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
    ) -> AuthResult<OAuthStart>;

    /// Finish a social sign-in with the code from the callback
    async fn exchange_code_for_session(&self, code: &str) -> AuthResult<Session>;

    /// End the current session, locally and at the provider
    async fn sign_out(&self) -> AuthResult<()>;

    /// Current session, restored from storage and refreshed if expired
    async fn get_session(&self) -> AuthResult<Option<Session>>;

    /// Send a password reset email linking to `redirect_to`
    async fn reset_password_for_email(&self, email: &str, redirect_to: &str) -> AuthResult<()>;

    /// Update the signed-in identity
    async fn update_user(&self, attributes: &UserAttributes) -> AuthResult<UserIdentity>;

    /// Register a session change handler
    fn on_auth_state_change(&self, handler: AuthChangeHandler) -> Subscription;
}
