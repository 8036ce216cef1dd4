//! Role-gated access decisions
//!
//! [`evaluate`] maps an [`AuthState`] and a required role to one render
//! choice. It never fails: unrecognized roles rank below every known role
//! and are denied.

use serde::Serialize;
use tracing::debug;

use crate::models::{has_permission, Role, Session};
use crate::store::{AuthState, SessionStore};

/// What a protected view should render
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GuardDecision {
    /// Session restore still running; show a waiting indicator
    Loading,
    /// Nobody is signed in; send the visitor to sign in
    Redirect { to: String },
    /// Signed in, profile not fetched yet; show a waiting indicator
    ProfilePending,
    /// Signed in, but the profile could not be fetched
    ProfileUnavailable { message: String },
    Authorized,
    Denied { current: Role, required: Role },
}

impl GuardDecision {
    /// Waiting states render an indicator and never redirect or deny
    pub fn is_waiting(&self) -> bool {
        matches!(self, GuardDecision::Loading | GuardDecision::ProfilePending)
    }

    pub fn is_authorized(&self) -> bool {
        matches!(self, GuardDecision::Authorized)
    }

    /// Explanation shown on the access-denied view
    pub fn denial_message(&self) -> Option<String> {
        match self {
            GuardDecision::Denied { current, required } => Some(format!(
                "You do not have permission to view this page. Your role: {}. Required role: {}.",
                current, required
            )),
            _ => None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            GuardDecision::Loading => "loading",
            GuardDecision::Redirect { .. } => "unauthenticated",
            GuardDecision::ProfilePending => "profile-pending",
            GuardDecision::ProfileUnavailable { .. } => "profile-unavailable",
            GuardDecision::Authorized => "authorized",
            GuardDecision::Denied { .. } => "denied",
        }
    }
}

/// Decide what to render for `location` given the current state
pub fn evaluate(
    state: &AuthState,
    required: &Role,
    sign_in_path: &str,
    location: &str,
) -> GuardDecision {
    if state.loading {
        return GuardDecision::Loading;
    }

    // A lapsed session counts as signed out until a refresh replaces it
    if state.session.as_ref().is_none_or(Session::has_lapsed) {
        return GuardDecision::Redirect {
            to: sign_in_redirect(sign_in_path, location),
        };
    }

    match &state.profile {
        None => match &state.profile_error {
            Some(message) => GuardDecision::ProfileUnavailable {
                message: message.clone(),
            },
            None => GuardDecision::ProfilePending,
        },
        Some(profile) if has_permission(&profile.role, required) => GuardDecision::Authorized,
        Some(profile) => GuardDecision::Denied {
            current: profile.role.clone(),
            required: required.clone(),
        },
    }
}

/// Sign-in URL that returns the visitor to `location` afterwards
pub fn sign_in_redirect(sign_in_path: &str, location: &str) -> String {
    format!("{}?redirect={}", sign_in_path, urlencoding::encode(location))
}

/// Guard bound to the process-wide session store
#[derive(Clone)]
pub struct AccessGuard {
    store: SessionStore,
    sign_in_path: String,
}

impl AccessGuard {
    pub fn new(store: SessionStore, sign_in_path: impl Into<String>) -> Self {
        Self {
            store,
            sign_in_path: sign_in_path.into(),
        }
    }

    pub fn sign_in_path(&self) -> &str {
        &self.sign_in_path
    }

    /// Evaluate access to `location` for the current state
    pub fn check(&self, required: &Role, location: &str) -> GuardDecision {
        let decision = evaluate(&self.store.state(), required, &self.sign_in_path, location);
        debug!(
            state = decision.label(),
            required = %required,
            location,
            "Access guard evaluated"
        );
        decision
    }
}
