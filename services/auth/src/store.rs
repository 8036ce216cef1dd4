//! Process-wide authentication state
//!
//! [`SessionStore`] is the single source of truth for who is signed in.
//! Reads are open to everyone; writes go through [`crate::AuthController`].
//! Every mutation notifies subscribers synchronously, in mutation order,
//! before the mutating call returns.

use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;
use uuid::Uuid;

use common::{Listeners, Subscription};

use crate::models::{Session, UserProfile};

/// Snapshot of the authentication state
#[derive(Debug, Clone, PartialEq)]
pub struct AuthState {
    pub session: Option<Session>,
    pub profile: Option<UserProfile>,
    /// True until the first session restore attempt has finished
    pub loading: bool,
    /// Set when passive profile resolution gave up
    pub profile_error: Option<String>,
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            session: None,
            profile: None,
            loading: true,
            profile_error: None,
        }
    }
}

impl AuthState {
    pub fn user_id(&self) -> Option<Uuid> {
        self.session.as_ref().map(Session::subject)
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }
}

struct Inner {
    state: RwLock<AuthState>,
    listeners: Listeners<AuthState>,
    /// Serializes mutate-then-notify so subscribers see writes in order
    writes: Mutex<()>,
    profile_requests: Mutex<Option<UnboundedSender<Session>>>,
}

/// Shared handle to the authentication state
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(AuthState::default()),
                listeners: Listeners::new(),
                writes: Mutex::new(()),
                profile_requests: Mutex::new(None),
            }),
        }
    }

    /// Current state snapshot
    pub fn state(&self) -> AuthState {
        self.read().clone()
    }

    /// Register a handler called with the new state after every mutation.
    ///
    /// Handlers run on the mutating thread and must not write to the store.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&AuthState) + Send + Sync + 'static,
    {
        self.inner.listeners.subscribe(handler)
    }

    fn read(&self) -> RwLockReadGuard<'_, AuthState> {
        self.inner
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, AuthState> {
        self.inner
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.inner
            .writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply `change` and notify subscribers if it reports a modification
    fn mutate<F>(&self, change: F) -> bool
    where
        F: FnOnce(&mut AuthState) -> bool,
    {
        let _order = self.lock_writes();
        let snapshot = {
            let mut state = self.write();
            if !change(&mut state) {
                return false;
            }
            state.clone()
        };
        self.inner.listeners.emit(&snapshot);
        true
    }

    /// Replace the session.
    ///
    /// A different subject (or no session) drops the cached profile; a
    /// refreshed session for the same subject keeps it. A non-empty session
    /// without a profile queues an asynchronous profile lookup.
    pub(crate) fn set_session(&self, session: Option<Session>) {
        let mut needs_profile = None;
        self.mutate(|state| {
            let previous = state.user_id();
            let next = session.as_ref().map(Session::subject);
            if previous != next {
                state.profile = None;
            }
            state.profile_error = None;
            state.session = session;
            if state.profile.is_none() {
                needs_profile = state.session.clone();
            }
            debug!(?previous, ?next, "Session replaced");
            true
        });

        if let Some(session) = needs_profile {
            self.request_profile(session);
        }
    }

    /// Store a fetched profile if `user_id` is still the current subject.
    ///
    /// Returns false when the fetch was for an identity that has since been
    /// replaced; the profile is then discarded.
    pub(crate) fn apply_profile(&self, user_id: Uuid, profile: UserProfile) -> bool {
        let applied = self.mutate(|state| {
            if state.user_id() != Some(user_id) {
                return false;
            }
            state.profile = Some(profile);
            state.profile_error = None;
            true
        });

        if !applied {
            debug!(%user_id, "Discarding profile for superseded identity");
        }
        applied
    }

    /// Record that profile resolution for `user_id` gave up.
    ///
    /// Ignored when the identity is no longer current or a profile is
    /// already present.
    pub(crate) fn fail_profile(&self, user_id: Uuid, message: impl Into<String>) -> bool {
        let message = message.into();
        self.mutate(|state| {
            if state.user_id() != Some(user_id) || state.profile.is_some() {
                return false;
            }
            state.profile_error = Some(message);
            true
        })
    }

    pub(crate) fn set_loading(&self, loading: bool) {
        self.mutate(|state| {
            if state.loading == loading {
                return false;
            }
            state.loading = loading;
            true
        });
    }

    /// Back to the signed-out state
    pub(crate) fn clear(&self) {
        self.mutate(|state| {
            let cleared = AuthState {
                loading: false,
                ..AuthState::default()
            };
            if *state == cleared {
                return false;
            }
            *state = cleared;
            true
        });
    }

    /// Route profile lookups triggered by session changes to `sender`
    pub(crate) fn connect_profile_requests(&self, sender: UnboundedSender<Session>) {
        *self.profile_requests() = Some(sender);
    }

    pub(crate) fn disconnect_profile_requests(&self) {
        self.profile_requests().take();
    }

    fn profile_requests(&self) -> MutexGuard<'_, Option<UnboundedSender<Session>>> {
        self.inner
            .profile_requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn request_profile(&self, session: Session) {
        if let Some(sender) = self.profile_requests().as_ref() {
            if sender.send(session).is_err() {
                debug!("Profile worker is gone, lookup not queued");
            }
        }
    }
}
