//! Session and authorization core
//!
//! Holds who is signed in ([`SessionStore`]), keeps it consistent with the
//! hosted identity provider ([`AuthController`]) and derives role-based
//! access decisions from it ([`AccessGuard`]).

pub mod controller;
pub mod error;
pub mod guard;
pub mod models;
pub mod oauth;
pub mod profile_resolver;
pub mod provider;
pub mod store;
pub mod validation;

pub use controller::{AuthController, AuthSettings, ProfileRetryPolicy, SignedIn};
pub use error::{AuthError, AuthResult};
pub use guard::{evaluate, sign_in_redirect, AccessGuard, GuardDecision};
pub use models::{has_permission, Role, Session, UserIdentity, UserProfile};
pub use oauth::{OAuthProvider, OAuthStart};
pub use profile_resolver::{ProfileResolver, ProfileWriter, RestProfileClient, SingleFlightResolver};
pub use provider::{IdentityProvider, SupabaseAuthProvider};
pub use store::{AuthState, SessionStore};
pub use validation::SignUpForm;
