//! Transport error types shared by every REST client in the workspace
//!
//! Errors are cloneable so a single in-flight request can hand the same
//! failure to every caller waiting on it.

use thiserror::Error;

/// Failure talking to a remote collaborator (identity provider, profile or
/// chat backend)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request never produced a response (DNS, connect, TLS, ...)
    #[error("Network error: {0}")]
    Network(String),

    /// The request did not complete in time
    #[error("Request timed out")]
    Timeout,

    /// The remote answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The response body could not be decoded
    #[error("Invalid response body: {0}")]
    Decode(String),

    /// The client itself is misconfigured
    #[error("Client configuration error: {0}")]
    Configuration(String),
}

impl TransportError {
    /// Returns true if the failure is worth retrying.
    ///
    /// Connection failures, timeouts, throttling and 5xx answers are
    /// transient; everything else will fail the same way again.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Network(_) | TransportError::Timeout => true,
            TransportError::Status { status, .. } => *status >= 500 || *status == 429,
            TransportError::Decode(_) | TransportError::Configuration(_) => false,
        }
    }

    /// HTTP status of the failed response, if there was one
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Message suitable for showing next to a form
    pub fn user_message(&self) -> String {
        match self {
            TransportError::Status { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            TransportError::Timeout
        } else if error.is_decode() {
            TransportError::Decode(error.to_string())
        } else if error.is_builder() {
            TransportError::Configuration(error.to_string())
        } else if let Some(status) = error.status() {
            TransportError::Status {
                status: status.as_u16(),
                message: error.to_string(),
            }
        } else {
            TransportError::Network(error.to_string())
        }
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(error: serde_json::Error) -> Self {
        TransportError::Decode(error.to_string())
    }
}

/// Type alias for Result with TransportError
pub type TransportResult<T> = Result<T, TransportError>;
