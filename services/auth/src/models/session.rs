//! Session model and related functionality

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity the provider authenticated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub metadata: UserMetadata,
}

/// Free-form attributes the provider keeps next to an identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Set by social providers instead of first/last name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// Provider-issued token bundle for one identity.
///
/// Sessions are replaced wholesale on every provider notification and are
/// never mutated in place.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserIdentity,
}

/// Sessions this close to expiry are refreshed before use
const EXPIRY_MARGIN_SECONDS: i64 = 10;

impl Session {
    /// Identity the session was issued for
    pub fn subject(&self) -> Uuid {
        self.user.id
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.refresh_at() <= now
    }

    /// When the session should be refreshed, shortly before it lapses
    pub fn refresh_at(&self) -> DateTime<Utc> {
        self.expires_at - Duration::seconds(EXPIRY_MARGIN_SECONDS)
    }

    /// Past `expires_at`; the tokens are no longer accepted anywhere
    pub fn has_lapsed(&self) -> bool {
        self.has_lapsed_at(Utc::now())
    }

    pub fn has_lapsed_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_expiring_at(expires_at: DateTime<Utc>) -> Session {
        Session {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at,
            user: UserIdentity {
                id: Uuid::new_v4(),
                email: Some("ada@example.com".to_string()),
                metadata: UserMetadata::default(),
            },
        }
    }

    #[test]
    fn test_session_expiry_includes_margin() {
        let now = Utc::now();
        assert!(!session_expiring_at(now + Duration::minutes(5)).is_expired_at(now));
        assert!(session_expiring_at(now + Duration::seconds(5)).is_expired_at(now));
        assert!(session_expiring_at(now - Duration::minutes(1)).is_expired_at(now));
    }

    #[test]
    fn test_refresh_is_due_before_session_lapses() {
        let now = Utc::now();
        let session = session_expiring_at(now + Duration::seconds(5));
        assert!(session.is_expired_at(now));
        assert!(!session.has_lapsed_at(now));
        assert!(session.has_lapsed_at(now + Duration::seconds(5)));
        assert_eq!(session.refresh_at(), session.expires_at - Duration::seconds(10));
    }

    #[test]
    fn test_debug_output_redacts_tokens() {
        let session = session_expiring_at(Utc::now());
        let debug = format!("{:?}", session);
        assert!(!debug.contains("access\""));
        assert!(debug.contains("<redacted>"));
    }
}
