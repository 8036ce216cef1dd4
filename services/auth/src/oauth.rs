//! Social sign-in with PKCE
//!
//! The provider hosts the OAuth dance; this side only builds the
//! authorization URL and keeps the PKCE verifier until the callback comes
//! back with a code to exchange.

use chrono::{DateTime, Duration, Utc};
use oauth2::{PkceCodeChallenge, PkceCodeVerifier};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AuthError;

/// How long a started social sign-in stays redeemable
const PENDING_SIGN_IN_TTL_MINUTES: i64 = 10;

/// OAuth2 provider types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Google,
    Github,
    Apple,
}

impl OAuthProvider {
    /// Get the provider name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
            OAuthProvider::Github => "github",
            OAuthProvider::Apple => "apple",
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OAuthProvider {
    type Err = AuthError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "google" => Ok(OAuthProvider::Google),
            "github" => Ok(OAuthProvider::Github),
            "apple" => Ok(OAuthProvider::Apple),
            other => Err(AuthError::Validation(format!(
                "Unsupported sign-in provider: {other}"
            ))),
        }
    }
}

/// Where to send the browser to start a social sign-in
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OAuthStart {
    pub provider: OAuthProvider,
    pub url: String,
}

/// Social sign-in waiting for its callback
pub struct PendingOAuth {
    provider: OAuthProvider,
    verifier: PkceCodeVerifier,
    started_at: DateTime<Utc>,
}

impl PendingOAuth {
    /// Start a sign-in: returns the pending state and the challenge to put
    /// in the authorization URL
    pub fn start(provider: OAuthProvider) -> (Self, PkceCodeChallenge) {
        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
        let pending = Self {
            provider,
            verifier,
            started_at: Utc::now(),
        };
        (pending, challenge)
    }

    pub fn provider(&self) -> OAuthProvider {
        self.provider
    }

    pub fn verifier(&self) -> &str {
        self.verifier.secret()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now - self.started_at > Duration::minutes(PENDING_SIGN_IN_TTL_MINUTES)
    }
}

/// Build the provider's authorization URL for a PKCE sign-in
pub fn authorization_url(
    authorize_endpoint: &str,
    provider: OAuthProvider,
    redirect_to: &str,
    challenge: &PkceCodeChallenge,
) -> String {
    format!(
        "{}?provider={}&redirect_to={}&code_challenge={}&code_challenge_method=s256",
        authorize_endpoint,
        provider.as_str(),
        urlencoding::encode(redirect_to),
        urlencoding::encode(challenge.as_str()),
    )
}
