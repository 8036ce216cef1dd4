//! Authentication controller
//!
//! Bridges the identity provider's push notifications and explicit user
//! actions into [`SessionStore`] updates. The controller is the store's only
//! writer.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::{Mutex, Notify};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, instrument, warn};

use common::config::{AuthConfig, ProfileRetryConfig};
use common::Subscription;

use crate::error::{AuthError, AuthResult};
use crate::models::{NewProfile, Session, UpdateProfile, UserIdentity, UserProfile};
use crate::oauth::{OAuthProvider, OAuthStart};
use crate::profile_resolver::{ProfileResolver, ProfileWriter, SingleFlightResolver};
use crate::provider::{IdentityProvider, SignUpRequest, UserAttributes};
use crate::store::{AuthState, SessionStore};
use crate::validation::{
    validate_credentials, validate_email, validate_name, validate_password_change, SignUpForm,
};

/// Longest sleep of the session refresher before it looks at the store again
const REFRESH_RECHECK: Duration = Duration::from_secs(60);
/// Pause after a refresh attempt that left the session unchanged
const REFRESH_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Backoff for profile lookups triggered by session changes
#[derive(Debug, Clone)]
pub struct ProfileRetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ProfileRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl ProfileRetryPolicy {
    /// Delay after the failed attempt number `attempt` (0-based), doubling
    /// each time up to `max_delay`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

impl From<&ProfileRetryConfig> for ProfileRetryPolicy {
    fn from(config: &ProfileRetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

/// Controller settings taken from the `auth` configuration section
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub oauth_redirect_url: String,
    pub password_reset_redirect_url: String,
    pub profile_retry: ProfileRetryPolicy,
}

impl From<&AuthConfig> for AuthSettings {
    fn from(config: &AuthConfig) -> Self {
        Self {
            oauth_redirect_url: config.oauth_redirect_url.clone(),
            password_reset_redirect_url: config.password_reset_redirect_url.clone(),
            profile_retry: ProfileRetryPolicy::from(&config.profile_retry),
        }
    }
}

/// Outcome of a completed sign-in
#[derive(Debug, Clone)]
pub struct SignedIn {
    pub session: Session,
    pub profile: UserProfile,
}

struct Mounted {
    subscription: Subscription,
    store_watch: Subscription,
    worker: JoinHandle<()>,
    refresher: JoinHandle<()>,
}

impl Mounted {
    fn stop(self) {
        self.subscription.unsubscribe();
        self.store_watch.unsubscribe();
        self.worker.abort();
        self.refresher.abort();
    }
}

/// Orchestrates sign-in, sign-up and sign-out and keeps [`SessionStore`]
/// in step with the provider
pub struct AuthController {
    provider: Arc<dyn IdentityProvider>,
    profiles: Arc<SingleFlightResolver>,
    writer: Arc<dyn ProfileWriter>,
    store: SessionStore,
    settings: AuthSettings,
    lifecycle: Mutex<Option<Mounted>>,
}

impl AuthController {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        resolver: Arc<dyn ProfileResolver>,
        writer: Arc<dyn ProfileWriter>,
        store: SessionStore,
        settings: AuthSettings,
    ) -> Self {
        Self {
            provider,
            profiles: Arc::new(SingleFlightResolver::new(resolver)),
            writer,
            store,
            settings,
            lifecycle: Mutex::new(None),
        }
    }

    /// Read handle to the authentication state
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn state(&self) -> AuthState {
        self.store.state()
    }

    /// Restore any existing session, then follow the provider's change
    /// stream. Mounting an already mounted controller does nothing.
    pub async fn mount(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.is_some() {
            debug!("Auth controller already mounted");
            return;
        }

        let (requests, receiver) = mpsc::unbounded_channel();
        self.store.connect_profile_requests(requests);
        let worker = tokio::spawn(run_profile_worker(
            receiver,
            Arc::clone(&self.profiles),
            self.store.clone(),
            self.settings.profile_retry.clone(),
        ));

        let restored = match self.provider.get_session().await {
            Ok(session) => session,
            Err(e) => {
                warn!("Session restore failed: {}", e);
                None
            }
        };
        info!(restored = restored.is_some(), "Session restore finished");
        self.store.set_session(restored);
        self.store.set_loading(false);

        let store = self.store.clone();
        let subscription = self.provider.on_auth_state_change(Box::new(move |change| {
            debug!(event = ?change.event, "Provider session change");
            store.set_session(change.session.clone());
        }));

        let wake = Arc::new(Notify::new());
        let notify = Arc::clone(&wake);
        let store_watch = self.store.subscribe(move |_| notify.notify_one());
        let refresher = tokio::spawn(run_session_refresher(
            Arc::clone(&self.provider),
            self.store.clone(),
            wake,
        ));

        *lifecycle = Some(Mounted {
            subscription,
            store_watch,
            worker,
            refresher,
        });
    }

    /// Release the provider subscription and stop background profile lookups
    /// and session refreshes
    pub async fn unmount(&self) {
        if let Some(mounted) = self.lifecycle.lock().await.take() {
            mounted.stop();
            self.store.disconnect_profile_requests();
            info!("Auth controller unmounted");
        }
    }

    pub async fn is_mounted(&self) -> bool {
        self.lifecycle.lock().await.is_some()
    }

    /// Sign in with email and password and resolve the profile before
    /// returning, so the caller can route by role right away
    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<SignedIn> {
        validate_credentials(email, password)?;

        let session = self
            .provider
            .sign_in_with_password(email.trim(), password)
            .await?;
        self.adopt_session(&session);

        match self.resolve_for(&session).await {
            Ok(profile) => {
                info!(user_id = %session.subject(), role = %profile.role, "Signed in");
                Ok(SignedIn { session, profile })
            }
            Err(e) => {
                warn!(user_id = %session.subject(), "Sign-in aborted: {}", e);
                self.abandon_session().await;
                Err(e)
            }
        }
    }

    /// Register an identity and its profile with the default `user` role
    #[instrument(skip(self, form), fields(email = %form.email))]
    pub async fn sign_up(&self, form: &SignUpForm) -> AuthResult<UserIdentity> {
        form.validate()?;

        let request = SignUpRequest {
            email: form.email.trim().to_string(),
            password: form.password.clone(),
            first_name: form.first_name.trim().to_string(),
            last_name: form.last_name.trim().to_string(),
        };
        let outcome = self.provider.sign_up(&request).await?;
        let user_id = outcome.user.id;

        let profile = NewProfile::registration(
            &outcome.user,
            &request.email,
            &request.first_name,
            &request.last_name,
        );
        let token = outcome.session.as_ref().map(|s| s.access_token.as_str());

        match self.writer.create(&profile, token).await {
            Ok(profile) => {
                if let Some(session) = &outcome.session {
                    self.adopt_session(session);
                    self.store.apply_profile(user_id, profile);
                }
                info!(%user_id, "Registration completed");
                Ok(outcome.user)
            }
            Err(e) => {
                error!(%user_id, "Identity created but profile creation failed: {}", e);
                if outcome.session.is_some() {
                    self.abandon_session().await;
                }
                Err(AuthError::PartialRegistration {
                    user_id,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Sign out locally and at the provider. Local state is always cleared;
    /// a failed remote sign-out is still reported.
    pub async fn sign_out(&self) -> AuthResult<()> {
        let result = self.provider.sign_out().await;
        self.store.clear();
        match &result {
            Ok(()) => info!("Signed out"),
            Err(e) => warn!("Signed out locally, provider sign-out failed: {}", e),
        }
        result
    }

    /// Start a social sign-in; `redirect_to` defaults to the configured
    /// callback URL
    pub async fn sign_in_with_oauth(
        &self,
        provider: OAuthProvider,
        redirect_to: Option<&str>,
    ) -> AuthResult<OAuthStart> {
        let redirect_to = redirect_to.unwrap_or(&self.settings.oauth_redirect_url);
        self.provider.sign_in_with_oauth(provider, redirect_to).await
    }

    /// Finish a social sign-in. The first social sign-in of an identity
    /// creates its profile from what the social provider shared.
    #[instrument(skip(self, code))]
    pub async fn complete_oauth(&self, code: &str) -> AuthResult<SignedIn> {
        if code.trim().is_empty() {
            return Err(AuthError::InvalidOAuthState("missing code".to_string()));
        }

        let session = self.provider.exchange_code_for_session(code).await?;
        self.adopt_session(&session);
        let user_id = session.subject();

        let resolved = match self.profiles.resolve(user_id, &session.access_token).await {
            Err(AuthError::NotFound(_)) => {
                info!(%user_id, "Creating profile for first social sign-in");
                self.writer
                    .create(
                        &NewProfile::from_identity(&session.user),
                        Some(&session.access_token),
                    )
                    .await
            }
            other => other,
        };

        match resolved {
            Ok(profile) => {
                self.store.apply_profile(user_id, profile.clone());
                Ok(SignedIn { session, profile })
            }
            Err(e) => {
                warn!(%user_id, "Social sign-in aborted: {}", e);
                self.abandon_session().await;
                Err(e)
            }
        }
    }

    /// Send a password reset email
    pub async fn reset_password(&self, email: &str) -> AuthResult<()> {
        validate_email(email).map_err(AuthError::Validation)?;
        self.provider
            .reset_password_for_email(email.trim(), &self.settings.password_reset_redirect_url)
            .await
    }

    /// Change the signed-in user's password
    pub async fn update_password(&self, password: &str, confirm_password: &str) -> AuthResult<()> {
        validate_password_change(password, confirm_password)?;
        if !self.store.state().is_authenticated() {
            return Err(AuthError::NotSignedIn);
        }

        let attributes = UserAttributes {
            password: Some(password.to_string()),
            ..UserAttributes::default()
        };
        self.provider.update_user(&attributes).await?;
        info!("Password updated");
        Ok(())
    }

    /// Edit the signed-in user's profile; the cached profile is replaced
    /// with the stored result
    pub async fn update_profile(&self, changes: &UpdateProfile) -> AuthResult<UserProfile> {
        if changes.is_empty() {
            return Err(AuthError::Validation("Nothing to update".to_string()));
        }
        if let Some(first_name) = &changes.first_name {
            validate_name("First name", first_name).map_err(AuthError::Validation)?;
        }
        if let Some(last_name) = &changes.last_name {
            validate_name("Last name", last_name).map_err(AuthError::Validation)?;
        }

        let session = self.current_session()?;
        let user_id = session.subject();
        let profile = self
            .writer
            .update(user_id, changes, &session.access_token)
            .await?;
        self.store.apply_profile(user_id, profile.clone());
        Ok(profile)
    }

    /// Fetch the profile again, e.g. after passive resolution gave up
    pub async fn reload_profile(&self) -> AuthResult<UserProfile> {
        let session = self.current_session()?;
        let user_id = session.subject();

        match self.resolve_for(&session).await {
            Ok(profile) => Ok(profile),
            Err(e) => {
                self.store.fail_profile(user_id, e.to_string());
                Err(e)
            }
        }
    }

    fn current_session(&self) -> AuthResult<Session> {
        self.store.state().session.ok_or(AuthError::NotSignedIn)
    }

    /// Make `session` current unless a notification already did
    fn adopt_session(&self, session: &Session) {
        if self.store.state().session.as_ref() != Some(session) {
            self.store.set_session(Some(session.clone()));
        }
    }

    /// Resolve and store the profile for an explicit user action. A missing
    /// row means the account is unusable rather than a guest.
    async fn resolve_for(&self, session: &Session) -> AuthResult<UserProfile> {
        let user_id = session.subject();
        let profile = self
            .profiles
            .resolve(user_id, &session.access_token)
            .await
            .map_err(|e| match e {
                AuthError::NotFound(user_id) => AuthError::ProfileMissing { user_id },
                other => other,
            })?;
        self.store.apply_profile(user_id, profile.clone());
        Ok(profile)
    }

    /// Undo a half-finished sign-in so no partial state remains
    async fn abandon_session(&self) {
        if let Err(e) = self.provider.sign_out().await {
            warn!("Provider sign-out during rollback failed: {}", e);
        }
        self.store.clear();
    }
}

impl Drop for AuthController {
    fn drop(&mut self) {
        if let Some(mounted) = self.lifecycle.get_mut().take() {
            mounted.stop();
            self.store.disconnect_profile_requests();
        }
    }
}

/// Resolve profiles for sessions set by provider notifications
async fn run_profile_worker(
    mut requests: UnboundedReceiver<Session>,
    profiles: Arc<SingleFlightResolver>,
    store: SessionStore,
    policy: ProfileRetryPolicy,
) {
    let mut lookups = JoinSet::new();
    loop {
        tokio::select! {
            request = requests.recv() => match request {
                Some(session) => {
                    lookups.spawn(resolve_passively(
                        Arc::clone(&profiles),
                        store.clone(),
                        policy.clone(),
                        session,
                    ));
                }
                None => break,
            },
            Some(_) = lookups.join_next(), if !lookups.is_empty() => {}
        }
    }

    while lookups.join_next().await.is_some() {}
    debug!("Profile worker stopped");
}

/// Keep the current session alive: shortly before it lapses ask the
/// provider for it, which refreshes the tokens and notifies the change
async fn run_session_refresher(
    provider: Arc<dyn IdentityProvider>,
    store: SessionStore,
    wake: Arc<Notify>,
) {
    loop {
        let mut wait = match store.state().session {
            Some(session) => (session.refresh_at() - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO)
                .min(REFRESH_RECHECK),
            None => REFRESH_RECHECK,
        };

        if wait.is_zero() {
            refresh_session(provider.as_ref(), &store).await;
            wait = REFRESH_RETRY_DELAY;
        }

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = wake.notified() => {}
        }
    }
}

async fn refresh_session(provider: &dyn IdentityProvider, store: &SessionStore) {
    let held = store.state().session;
    debug!(user_id = ?held.as_ref().map(Session::subject), "Session refresh due");

    match provider.get_session().await {
        Ok(current) => {
            let current = current.filter(|session| !session.has_lapsed());
            // The provider may answer without a change notification
            let still_due = store
                .state()
                .session
                .as_ref()
                .is_some_and(Session::is_expired);
            if still_due && store.state().session != current {
                info!(refreshed = current.is_some(), "Session replaced after refresh");
                store.set_session(current);
            }
        }
        Err(e) => warn!("Session refresh failed: {}", e),
    }
}

async fn resolve_passively(
    profiles: Arc<SingleFlightResolver>,
    store: SessionStore,
    policy: ProfileRetryPolicy,
    session: Session,
) {
    let user_id = session.subject();
    let mut attempt = 0;

    loop {
        if store.state().user_id() != Some(user_id) {
            debug!(%user_id, "Identity superseded, dropping profile lookup");
            return;
        }

        attempt += 1;
        match profiles.resolve(user_id, &session.access_token).await {
            Ok(profile) => {
                store.apply_profile(user_id, profile);
                return;
            }
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_for_attempt(attempt - 1);
                warn!(%user_id, attempt, ?delay, "Profile lookup failed, retrying: {}", e);
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                error!(%user_id, attempt, "Profile lookup gave up: {}", e);
                store.fail_profile(user_id, e.to_string());
                return;
            }
        }
    }
}
