//! Error responses for the web front end

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use auth::AuthError;
use chat::ChatError;
use common::TransportError;

/// Error type for the web handlers
#[derive(Error, Debug)]
pub enum WebError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Chat(#[from] ChatError),

    /// Bad request with message
    #[error("{0}")]
    BadRequest(String),
}

/// Status for a failed provider call: outages are 503, anything else the
/// provider refused is a bad gateway
fn transport_status(error: &TransportError) -> StatusCode {
    if error.is_transient() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::BAD_GATEWAY
    }
}

impl WebError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            WebError::Auth(error) => match error {
                AuthError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
                AuthError::NotSignedIn => (StatusCode::UNAUTHORIZED, "not_signed_in"),
                AuthError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                AuthError::ProfileMissing { .. } => (StatusCode::CONFLICT, "profile_missing"),
                AuthError::PartialRegistration { .. } => {
                    (StatusCode::CONFLICT, "partial_registration")
                }
                AuthError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
                AuthError::InvalidOAuthState(_) => (StatusCode::BAD_REQUEST, "invalid_oauth_state"),
                AuthError::Transport(e) => (transport_status(e), "provider_unavailable"),
                AuthError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage"),
            },
            WebError::Chat(error) => match error {
                ChatError::NotAuthenticated => (StatusCode::UNAUTHORIZED, "not_signed_in"),
                ChatError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
                ChatError::MalformedResponse(_) => (StatusCode::BAD_GATEWAY, "malformed_response"),
                ChatError::ConversationNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                ChatError::Transport(e) => (transport_status(e), "chat_unavailable"),
            },
            WebError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
        }
    }

    /// Message shown to the user; provider text is passed through as is
    fn message(&self) -> String {
        match self {
            WebError::Auth(AuthError::Transport(e)) | WebError::Chat(ChatError::Transport(e)) => {
                e.user_message()
            }
            WebError::Auth(AuthError::Storage(_)) => "Session storage error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        let body = Json(json!({
            "error": self.message(),
            "code": code,
        }));

        (status, body).into_response()
    }
}

/// Type alias for handler results
pub type WebResult<T> = Result<T, WebError>;
