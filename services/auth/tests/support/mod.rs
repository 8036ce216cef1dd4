//! In-memory stand-ins for the identity provider and the profile backend
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use common::{Listeners, Subscription, TransportError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use auth::models::{NewProfile, UpdateProfile, UserMetadata};
use auth::oauth::{OAuthProvider, OAuthStart};
use auth::provider::{
    AuthChange, AuthChangeEvent, AuthChangeHandler, IdentityProvider, SignUpOutcome,
    SignUpRequest, UserAttributes,
};
use auth::{
    AuthController, AuthError, AuthResult, AuthSettings, AuthState, ProfileResolver,
    ProfileRetryPolicy, ProfileWriter, Role, Session, SessionStore, UserIdentity, UserProfile,
};

pub fn identity(email: &str) -> UserIdentity {
    UserIdentity {
        id: Uuid::new_v4(),
        email: Some(email.to_string()),
        metadata: UserMetadata::default(),
    }
}

pub fn session_for(user: &UserIdentity, token: &str) -> Session {
    Session {
        access_token: token.to_string(),
        refresh_token: format!("{token}-refresh"),
        expires_at: Utc::now() + ChronoDuration::hours(1),
        user: user.clone(),
    }
}

/// Session whose refresh falls due `after` from now
pub fn session_due_in(user: &UserIdentity, token: &str, after: ChronoDuration) -> Session {
    Session {
        expires_at: Utc::now() + ChronoDuration::seconds(10) + after,
        ..session_for(user, token)
    }
}

pub fn profile_for(user: &UserIdentity, role: Role) -> UserProfile {
    UserProfile {
        id: user.id,
        email: user.email.clone().unwrap_or_default(),
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        avatar_url: None,
        role,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// Identity provider keeping accounts and the session in memory
#[derive(Default)]
pub struct FakeProvider {
    listeners: Listeners<AuthChange>,
    session: Mutex<Option<Session>>,
    accounts: Mutex<HashMap<String, (String, UserIdentity)>>,
    tokens: AtomicUsize,
    calls: AtomicUsize,
    /// Sign-up signs the user in right away
    pub sign_up_signs_in: AtomicBool,
    pub social_identity: Mutex<Option<UserIdentity>>,
    /// Refresh grants are refused, signing the user out
    pub reject_refresh: AtomicBool,
    refreshes: AtomicUsize,
}

impl FakeProvider {
    pub fn add_account(&self, email: &str, password: &str) -> UserIdentity {
        let user = identity(email);
        self.accounts
            .lock()
            .unwrap()
            .insert(email.to_string(), (password.to_string(), user.clone()));
        user
    }

    /// Pretend a session was left behind by an earlier run
    pub fn restore(&self, session: Session) {
        *self.session.lock().unwrap() = Some(session);
    }

    /// Push a session change as if it originated at the provider
    pub fn push(&self, event: AuthChangeEvent, session: Option<Session>) {
        *self.session.lock().unwrap() = session.clone();
        self.listeners.emit(&AuthChange { event, session });
    }

    pub fn remote_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn subscribers(&self) -> usize {
        self.listeners.len()
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> Option<Session> {
        self.session.lock().unwrap().clone()
    }

    fn issue(&self, user: &UserIdentity) -> Session {
        let n = self.tokens.fetch_add(1, Ordering::SeqCst);
        session_for(user, &format!("token-{n}"))
    }

    fn establish(&self, session: Session) -> Session {
        self.push(AuthChangeEvent::SignedIn, Some(session.clone()));
        session
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    async fn sign_up(&self, request: &SignUpRequest) -> AuthResult<SignUpOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let user = self.add_account(&request.email, &request.password);
        let session = if self.sign_up_signs_in.load(Ordering::SeqCst) {
            Some(self.establish(self.issue(&user)))
        } else {
            None
        };
        Ok(SignUpOutcome { user, session })
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<Session> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let account = self.accounts.lock().unwrap().get(email).cloned();
        match account {
            Some((expected, user)) if expected == password => Ok(self.establish(self.issue(&user))),
            _ => Err(AuthError::Unauthorized(
                "Invalid login credentials".to_string(),
            )),
        }
    }

    async fn sign_in_with_oauth(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
    ) -> AuthResult<OAuthStart> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(OAuthStart {
            provider,
            url: format!("https://provider.test/authorize?provider={provider}&redirect_to={redirect_to}"),
        })
    }

    async fn exchange_code_for_session(&self, code: &str) -> AuthResult<Session> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let user = self.social_identity.lock().unwrap().clone();
        match user {
            Some(user) if code == "valid-code" => Ok(self.establish(self.issue(&user))),
            _ => Err(AuthError::Unauthorized("invalid flow state".to_string())),
        }
    }

    async fn sign_out(&self) -> AuthResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let previous = self.session.lock().unwrap().take();
        if previous.is_some() {
            self.listeners.emit(&AuthChange {
                event: AuthChangeEvent::SignedOut,
                session: None,
            });
        }
        Ok(())
    }

    async fn get_session(&self) -> AuthResult<Option<Session>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.current() {
            Some(session) if session.is_expired() => {
                self.refreshes.fetch_add(1, Ordering::SeqCst);
                if self.reject_refresh.load(Ordering::SeqCst) {
                    self.push(AuthChangeEvent::SignedOut, None);
                    return Ok(None);
                }
                let refreshed = self.issue(&session.user);
                self.push(AuthChangeEvent::TokenRefreshed, Some(refreshed.clone()));
                Ok(Some(refreshed))
            }
            current => Ok(current),
        }
    }

    async fn reset_password_for_email(&self, _email: &str, _redirect_to: &str) -> AuthResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update_user(&self, _attributes: &UserAttributes) -> AuthResult<UserIdentity> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.current()
            .map(|session| session.user)
            .ok_or(AuthError::NotSignedIn)
    }

    fn on_auth_state_change(&self, handler: AuthChangeHandler) -> Subscription {
        self.listeners.subscribe(move |change| handler(change))
    }
}

/// Profile table kept in memory
#[derive(Default)]
pub struct FakeProfiles {
    rows: Mutex<HashMap<Uuid, UserProfile>>,
    delays: Mutex<HashMap<Uuid, Duration>>,
    resolve_calls: AtomicUsize,
    /// Upcoming lookups that fail with a network error
    pub transient_failures: AtomicUsize,
    /// Every lookup is rejected by the backend
    pub reject_lookups: AtomicBool,
    pub reject_writes: AtomicBool,
}

impl FakeProfiles {
    pub fn insert(&self, profile: UserProfile) {
        self.rows.lock().unwrap().insert(profile.id, profile);
    }

    pub fn get(&self, user_id: Uuid) -> Option<UserProfile> {
        self.rows.lock().unwrap().get(&user_id).cloned()
    }

    pub fn delay(&self, user_id: Uuid, delay: Duration) {
        self.delays.lock().unwrap().insert(user_id, delay);
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileResolver for FakeProfiles {
    async fn resolve(&self, user_id: Uuid, _access_token: &str) -> AuthResult<UserProfile> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.delays.lock().unwrap().get(&user_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let pending_failures = self.transient_failures.load(Ordering::SeqCst);
        if pending_failures > 0 {
            self.transient_failures
                .store(pending_failures - 1, Ordering::SeqCst);
            return Err(TransportError::Network("connection reset".to_string()).into());
        }

        if self.reject_lookups.load(Ordering::SeqCst) {
            return Err(TransportError::Status {
                status: 403,
                message: "permission denied for table profiles".to_string(),
            }
            .into());
        }

        self.get(user_id).ok_or(AuthError::NotFound(user_id))
    }
}

#[async_trait]
impl ProfileWriter for FakeProfiles {
    async fn create(
        &self,
        profile: &NewProfile,
        _access_token: Option<&str>,
    ) -> AuthResult<UserProfile> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(TransportError::Status {
                status: 409,
                message: "duplicate key value violates unique constraint".to_string(),
            }
            .into());
        }

        let row = UserProfile {
            id: profile.id,
            email: profile.email.clone(),
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
            avatar_url: profile.avatar_url.clone(),
            role: profile.role.clone(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.insert(row.clone());
        Ok(row)
    }

    async fn update(
        &self,
        user_id: Uuid,
        changes: &UpdateProfile,
        _access_token: &str,
    ) -> AuthResult<UserProfile> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows.get_mut(&user_id).ok_or(AuthError::NotFound(user_id))?;
        if let Some(first_name) = &changes.first_name {
            row.first_name = first_name.clone();
        }
        if let Some(last_name) = &changes.last_name {
            row.last_name = last_name.clone();
        }
        if let Some(avatar_url) = &changes.avatar_url {
            row.avatar_url = Some(avatar_url.clone());
        }
        row.updated_at = Utc::now();
        Ok(row.clone())
    }
}

pub struct Harness {
    pub provider: Arc<FakeProvider>,
    pub profiles: Arc<FakeProfiles>,
    pub store: SessionStore,
    pub controller: AuthController,
}

pub fn settings() -> AuthSettings {
    AuthSettings {
        oauth_redirect_url: "http://localhost:3000/auth/callback".to_string(),
        password_reset_redirect_url: "http://localhost:3000/auth/update-password".to_string(),
        profile_retry: ProfileRetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
        },
    }
}

pub fn harness() -> Harness {
    let provider = Arc::new(FakeProvider::default());
    let profiles = Arc::new(FakeProfiles::default());
    let store = SessionStore::new();
    let controller = AuthController::new(
        provider.clone(),
        profiles.clone(),
        profiles.clone(),
        store.clone(),
        settings(),
    );
    Harness {
        provider,
        profiles,
        store,
        controller,
    }
}

/// Wait until the store reaches a state matching `done`
pub async fn eventually<F>(store: &SessionStore, done: F) -> AuthState
where
    F: Fn(&AuthState) -> bool,
{
    for _ in 0..400 {
        let state = store.state();
        if done(&state) {
            return state;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("state never settled: {:?}", store.state());
}
