//! Authentication error types.

use common::TransportError;
use thiserror::Error;
use uuid::Uuid;

/// Authentication error type.
///
/// Variants are cloneable so a coalesced profile fetch can hand the same
/// outcome to every waiter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    /// Credentials were rejected; carries the provider's message
    #[error("{0}")]
    Unauthorized(String),

    /// No profile row exists for the identity
    #[error("No profile found for user {0}")]
    NotFound(Uuid),

    /// Authenticated, but the identity has no profile
    #[error("Signed in, but no profile exists for this account ({user_id})")]
    ProfileMissing { user_id: Uuid },

    /// The identity was created but its profile could not be saved
    #[error("Account {user_id} was created but its profile could not be saved: {reason}")]
    PartialRegistration { user_id: Uuid, reason: String },

    /// Network or provider failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Client-side form invariant violated; no remote call was made
    #[error("{0}")]
    Validation(String),

    /// The operation needs a signed-in user
    #[error("Not signed in")]
    NotSignedIn,

    /// OAuth callback does not match a sign-in started here
    #[error("Invalid OAuth callback: {0}")]
    InvalidOAuthState(String),

    /// Local session persistence failed
    #[error("Session storage error: {0}")]
    Storage(String),
}

impl AuthError {
    /// Returns true if this error is transient and the operation can be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Transport(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl From<std::io::Error> for AuthError {
    fn from(error: std::io::Error) -> Self {
        AuthError::Storage(error.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(error: serde_json::Error) -> Self {
        AuthError::Storage(error.to_string())
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
