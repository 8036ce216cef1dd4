//! Browser that holds the signed-in session
//!
//! The process keeps one session. Signing in over HTTP mints a random
//! token handed to that browser in an HTTP-only cookie; requests without
//! the matching cookie are treated as anonymous.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "membership_session";

#[derive(Clone, Default)]
pub struct SessionOwner {
    token: Arc<Mutex<Option<String>>>,
}

impl SessionOwner {
    pub fn new() -> Self {
        Self::default()
    }

    fn token(&self) -> MutexGuard<'_, Option<String>> {
        self.token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Hand the session to the browser behind `jar`, replacing any
    /// previous holder
    pub fn claim(&self, jar: CookieJar) -> CookieJar {
        let token = Uuid::new_v4().simple().to_string();
        *self.token() = Some(token.clone());
        debug!("Session ownership claimed");

        jar.add(
            Cookie::build((SESSION_COOKIE, token))
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax),
        )
    }

    /// Forget the holder and expire its cookie
    pub fn release(&self, jar: CookieJar) -> CookieJar {
        self.token().take();
        jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
    }

    /// Whether the request carries the current holder's cookie
    pub fn is_owner(&self, jar: &CookieJar) -> bool {
        let Some(presented) = jar.get(SESSION_COOKIE) else {
            return false;
        };
        self.token()
            .as_deref()
            .is_some_and(|token| token == presented.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn presenting(value: &str) -> CookieJar {
        CookieJar::new().add(Cookie::new(SESSION_COOKIE, value.to_string()))
    }

    #[test]
    fn test_only_latest_claim_owns_the_session() {
        let owner = SessionOwner::new();
        assert!(!owner.is_owner(&CookieJar::new()));

        let first = owner.claim(CookieJar::new());
        let first_token = first.get(SESSION_COOKIE).unwrap().value().to_string();
        assert!(owner.is_owner(&presenting(&first_token)));
        assert!(!owner.is_owner(&presenting("guessed")));

        let second = owner.claim(CookieJar::new());
        let second_token = second.get(SESSION_COOKIE).unwrap().value().to_string();
        assert!(!owner.is_owner(&presenting(&first_token)));
        assert!(owner.is_owner(&presenting(&second_token)));
    }

    #[test]
    fn test_release_ends_ownership() {
        let owner = SessionOwner::new();
        let jar = owner.claim(CookieJar::new());
        let token = jar.get(SESSION_COOKIE).unwrap().value().to_string();

        let jar = owner.release(jar);
        assert!(jar.get(SESSION_COOKIE).is_none());
        assert!(!owner.is_owner(&presenting(&token)));
    }
}
