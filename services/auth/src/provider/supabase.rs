//! Identity provider backed by a Supabase-style auth REST API

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use common::{Listeners, RestClient, Subscription, TransportError};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::storage::SessionStorage;
use super::{
    AuthChange, AuthChangeEvent, AuthChangeHandler, IdentityProvider, SignUpOutcome,
    SignUpRequest, UserAttributes,
};
use crate::error::{AuthError, AuthResult};
use crate::models::{Session, UserIdentity, UserMetadata};
use crate::oauth::{authorization_url, OAuthProvider, OAuthStart, PendingOAuth};

/// User object as returned by the auth API
#[derive(Debug, Deserialize)]
struct UserRecord {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: UserMetadata,
}

impl From<UserRecord> for UserIdentity {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id,
            email: record.email.filter(|email| !email.is_empty()),
            metadata: record.user_metadata,
        }
    }
}

/// Token grant response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: UserRecord,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or_else(|| Utc::now() + Duration::seconds(self.expires_in.unwrap_or(3600)));

        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user.into(),
        }
    }
}

/// Sign-up answers with a full token grant when no confirmation email is
/// required, and with the bare user otherwise
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    WithSession(TokenResponse),
    UserOnly(UserRecord),
}

/// Map a failed credential exchange: rejections carry the provider's
/// message, anything else stays a transport failure
fn credential_error(error: TransportError, rejected: &[u16]) -> AuthError {
    match &error {
        TransportError::Status { status, message } if rejected.contains(status) => {
            AuthError::Unauthorized(message.clone())
        }
        _ => AuthError::Transport(error),
    }
}

/// Supabase-compatible identity provider
pub struct SupabaseAuthProvider {
    client: RestClient,
    storage: Arc<dyn SessionStorage>,
    listeners: Listeners<AuthChange>,
    pending_oauth: Mutex<Option<PendingOAuth>>,
}

impl SupabaseAuthProvider {
    pub fn new(client: RestClient, storage: Arc<dyn SessionStorage>) -> Self {
        Self {
            client,
            storage,
            listeners: Listeners::new(),
            pending_oauth: Mutex::new(None),
        }
    }

    fn pending(&self) -> MutexGuard<'_, Option<PendingOAuth>> {
        self.pending_oauth
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn notify(&self, event: AuthChangeEvent, session: Option<Session>) {
        debug!(?event, "Auth state change");
        self.listeners.emit(&AuthChange { event, session });
    }

    /// Persist a fresh session and announce it
    fn establish(&self, session: Session, event: AuthChangeEvent) -> AuthResult<Session> {
        self.storage.save(&session)?;
        self.notify(event, Some(session.clone()));
        Ok(session)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, TransportError> {
        let url = self.client.auth_url("token?grant_type=refresh_token");
        let request = self
            .client
            .request(Method::POST, &url, None)
            .json(&json!({ "refresh_token": refresh_token }));
        let response: TokenResponse = self.client.send_json(request).await?;
        Ok(response.into_session())
    }

    /// Stored session, or `None` when storage cannot be read
    fn stored_session(&self) -> Option<Session> {
        self.storage.load().unwrap_or_else(|e| {
            warn!("Failed to read stored session: {}", e);
            None
        })
    }
}

#[async_trait]
impl IdentityProvider for SupabaseAuthProvider {
    async fn sign_up(&self, request: &SignUpRequest) -> AuthResult<SignUpOutcome> {
        let url = self.client.auth_url("signup");
        let body = json!({
            "email": request.email,
            "password": request.password,
            "data": {
                "first_name": request.first_name,
                "last_name": request.last_name,
            },
        });

        let response: SignUpResponse = self
            .client
            .send_json(self.client.request(Method::POST, &url, None).json(&body))
            .await
            .map_err(|e| credential_error(e, &[400, 422]))?;

        match response {
            SignUpResponse::WithSession(tokens) => {
                let session = self.establish(tokens.into_session(), AuthChangeEvent::SignedIn)?;
                info!(user_id = %session.subject(), "Identity registered and signed in");
                Ok(SignUpOutcome {
                    user: session.user.clone(),
                    session: Some(session),
                })
            }
            SignUpResponse::UserOnly(user) => {
                let user = UserIdentity::from(user);
                info!(user_id = %user.id, "Identity registered, confirmation pending");
                Ok(SignUpOutcome {
                    user,
                    session: None,
                })
            }
        }
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<Session> {
        let url = self.client.auth_url("token?grant_type=password");
        let request = self
            .client
            .request(Method::POST, &url, None)
            .json(&json!({ "email": email, "password": password }));

        let tokens: TokenResponse = self
            .client
            .send_json(request)
            .await
            .map_err(|e| credential_error(e, &[400, 401, 422]))?;

        self.establish(tokens.into_session(), AuthChangeEvent::SignedIn)
    }

    async fn sign_in_with_oauth(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
    ) -> AuthResult<OAuthStart> {
        let (pending, challenge) = PendingOAuth::start(provider);
        let url = authorization_url(
            &self.client.auth_url("authorize"),
            provider,
            redirect_to,
            &challenge,
        );

        // Starting again replaces any sign-in that never came back
        *self.pending() = Some(pending);
        debug!(%provider, "OAuth sign-in started");

        Ok(OAuthStart { provider, url })
    }

    async fn exchange_code_for_session(&self, code: &str) -> AuthResult<Session> {
        let pending = self
            .pending()
            .take()
            .ok_or_else(|| AuthError::InvalidOAuthState("no sign-in in progress".to_string()))?;

        if pending.is_expired_at(Utc::now()) {
            return Err(AuthError::InvalidOAuthState(
                "sign-in attempt expired".to_string(),
            ));
        }

        let url = self.client.auth_url("token?grant_type=pkce");
        let request = self.client.request(Method::POST, &url, None).json(&json!({
            "auth_code": code,
            "code_verifier": pending.verifier(),
        }));

        let tokens: TokenResponse = self
            .client
            .send_json(request)
            .await
            .map_err(|e| credential_error(e, &[400, 401, 403, 422]))?;

        info!(provider = %pending.provider(), "OAuth sign-in completed");
        self.establish(tokens.into_session(), AuthChangeEvent::SignedIn)
    }

    async fn sign_out(&self) -> AuthResult<()> {
        let current = self.stored_session();
        self.storage.clear()?;

        let Some(session) = current else {
            return Ok(());
        };
        self.notify(AuthChangeEvent::SignedOut, None);

        let url = self.client.auth_url("logout");
        let request = self
            .client
            .request(Method::POST, &url, Some(&session.access_token));

        match self.client.send_empty(request).await {
            Ok(()) => Ok(()),
            // The token is already dead remotely
            Err(TransportError::Status { status, .. }) if matches!(status, 401 | 403 | 404) => {
                Ok(())
            }
            Err(e) => {
                warn!("Remote sign-out failed: {}", e);
                Err(e.into())
            }
        }
    }

    async fn get_session(&self) -> AuthResult<Option<Session>> {
        let Some(session) = self.storage.load()? else {
            return Ok(None);
        };

        if !session.is_expired() {
            return Ok(Some(session));
        }

        debug!(user_id = %session.subject(), "Stored session expired, refreshing");
        match self.refresh(&session.refresh_token).await {
            Ok(refreshed) => self
                .establish(refreshed, AuthChangeEvent::TokenRefreshed)
                .map(Some),
            Err(e) if e.is_transient() => Err(e.into()),
            Err(e) => {
                info!("Session refresh rejected, signing out: {}", e);
                self.storage.clear()?;
                self.notify(AuthChangeEvent::SignedOut, None);
                Ok(None)
            }
        }
    }

    async fn reset_password_for_email(&self, email: &str, redirect_to: &str) -> AuthResult<()> {
        let url = self.client.auth_url(&format!(
            "recover?redirect_to={}",
            urlencoding::encode(redirect_to)
        ));
        let request = self
            .client
            .request(Method::POST, &url, None)
            .json(&json!({ "email": email }));

        self.client.send_empty(request).await?;
        Ok(())
    }

    async fn update_user(&self, attributes: &UserAttributes) -> AuthResult<UserIdentity> {
        let session = self.get_session().await?.ok_or(AuthError::NotSignedIn)?;

        let url = self.client.auth_url("user");
        let request = self
            .client
            .request(Method::PUT, &url, Some(&session.access_token))
            .json(attributes);

        let record: UserRecord = self
            .client
            .send_json(request)
            .await
            .map_err(|e| credential_error(e, &[401, 403, 422]))?;
        let user = UserIdentity::from(record);

        let updated = Session {
            user: user.clone(),
            ..session
        };
        self.establish(updated, AuthChangeEvent::UserUpdated)?;
        Ok(user)
    }

    fn on_auth_state_change(&self, handler: AuthChangeHandler) -> Subscription {
        self.listeners.subscribe(move |change| handler(change))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_response_prefers_absolute_expiry() {
        let body = r#"{
            "access_token": "a",
            "refresh_token": "r",
            "expires_in": 3600,
            "expires_at": 1700000000,
            "user": {"id": "6f0c5a84-3a43-4c55-9d68-2f4b4f1f4a11", "email": "ada@example.com"}
        }"#;
        let session = serde_json::from_str::<TokenResponse>(body)
            .unwrap()
            .into_session();
        assert_eq!(session.expires_at.timestamp(), 1_700_000_000);
        assert_eq!(session.user.email.as_deref(), Some("ada@example.com"));
    }

    #[test]
    fn test_sign_up_response_without_session() {
        let body = r#"{"id": "6f0c5a84-3a43-4c55-9d68-2f4b4f1f4a11", "email": "ada@example.com",
            "user_metadata": {"first_name": "Ada"}}"#;
        match serde_json::from_str::<SignUpResponse>(body).unwrap() {
            SignUpResponse::UserOnly(user) => {
                assert_eq!(user.user_metadata.first_name.as_deref(), Some("Ada"))
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_credential_error_mapping() {
        let rejected = TransportError::Status {
            status: 400,
            message: "Invalid login credentials".to_string(),
        };
        assert_eq!(
            credential_error(rejected, &[400]),
            AuthError::Unauthorized("Invalid login credentials".to_string())
        );

        let outage = TransportError::Status {
            status: 503,
            message: "unavailable".to_string(),
        };
        assert!(credential_error(outage, &[400]).is_transient());
    }
}
