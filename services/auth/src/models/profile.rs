//! User profile model and related functionality

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::role::Role;
use super::session::UserIdentity;

/// Application-level record carrying role and display attributes, keyed by
/// the identity the provider issued
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn display_name(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name);
        let name = name.trim();
        if name.is_empty() {
            self.email.clone()
        } else {
            name.to_string()
        }
    }
}

/// New profile creation payload (upserted by identity)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProfile {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub role: Role,
}

impl NewProfile {
    /// Profile for a freshly registered identity; every new account starts
    /// with the `user` role
    pub fn registration(
        identity: &UserIdentity,
        email: &str,
        first_name: &str,
        last_name: &str,
    ) -> Self {
        Self {
            id: identity.id,
            email: email.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            avatar_url: None,
            role: Role::User,
        }
    }

    /// Profile derived from what a social provider shared about the identity
    pub fn from_identity(identity: &UserIdentity) -> Self {
        let metadata = &identity.metadata;
        let (first_name, last_name) = match (&metadata.first_name, &metadata.last_name) {
            (Some(first), Some(last)) => (first.clone(), last.clone()),
            _ => split_full_name(metadata.full_name.as_deref().unwrap_or_default()),
        };

        Self {
            id: identity.id,
            email: identity.email.clone().unwrap_or_default(),
            first_name,
            last_name,
            avatar_url: metadata.avatar_url.clone(),
            role: Role::User,
        }
    }
}

fn split_full_name(full_name: &str) -> (String, String) {
    let full_name = full_name.trim();
    match full_name.split_once(char::is_whitespace) {
        Some((first, rest)) => (first.to_string(), rest.trim().to_string()),
        None => (full_name.to_string(), String::new()),
    }
}

/// Profile update payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UpdateProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl UpdateProfile {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none() && self.last_name.is_none() && self.avatar_url.is_none()
    }
}
