//! Role model and the privilege ordering used for access decisions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role carried by a user profile.
///
/// Recognized roles form a total order `guest < user < superadmin`. Any
/// other value coming back from the backend is kept verbatim as
/// `Unrecognized` and ranks below every recognized role, so it can never
/// satisfy a requirement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Guest,
    User,
    Superadmin,
    Unrecognized(String),
}

impl Role {
    /// Privilege rank; 0 for unrecognized roles
    pub fn rank(&self) -> u8 {
        match self {
            Role::Guest => 1,
            Role::User => 2,
            Role::Superadmin => 3,
            Role::Unrecognized(_) => 0,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Role::Guest => "guest",
            Role::User => "user",
            Role::Superadmin => "superadmin",
            Role::Unrecognized(name) => name,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Role::Unrecognized(_))
    }

    /// Whether this role grants access to something requiring `required`
    pub fn satisfies(&self, required: &Role) -> bool {
        has_permission(self, required)
    }
}

/// Permission holds iff both roles are recognized and
/// `rank(role) >= rank(required)`.
pub fn has_permission(role: &Role, required: &Role) -> bool {
    role.is_recognized() && required.is_recognized() && role.rank() >= required.rank()
}

impl From<&str> for Role {
    fn from(value: &str) -> Self {
        match value {
            "guest" => Role::Guest,
            "user" => Role::User,
            "superadmin" => Role::Superadmin,
            other => Role::Unrecognized(other.to_string()),
        }
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        Role::from(value.as_str())
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::Unrecognized(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn any_role() -> impl Strategy<Value = Role> {
        prop_oneof![
            Just(Role::Guest),
            Just(Role::User),
            Just(Role::Superadmin),
            "[a-z]{1,12}".prop_map(Role::from),
        ]
    }

    #[test]
    fn test_ranks_follow_privilege_order() {
        assert!(Role::Guest.rank() < Role::User.rank());
        assert!(Role::User.rank() < Role::Superadmin.rank());
        assert_eq!(Role::from("moderator").rank(), 0);
    }

    #[test]
    fn test_unrecognized_roles_fail_closed() {
        let moderator = Role::from("moderator");
        assert!(!has_permission(&moderator, &Role::Guest));
        assert!(!has_permission(&Role::Superadmin, &moderator));
        assert!(!has_permission(&moderator, &moderator));
    }

    #[test]
    fn test_role_names_are_case_sensitive() {
        assert_eq!(Role::from("Superadmin"), Role::Unrecognized("Superadmin".to_string()));
    }

    #[test]
    fn test_role_serde_uses_plain_strings() {
        assert_eq!(serde_json::to_string(&Role::Superadmin).unwrap(), r#""superadmin""#);
        let parsed: Role = serde_json::from_str(r#""user""#).unwrap();
        assert_eq!(parsed, Role::User);
        let unknown: Role = serde_json::from_str(r#""editor""#).unwrap();
        assert_eq!(unknown, Role::Unrecognized("editor".to_string()));
        assert_eq!(serde_json::to_string(&unknown).unwrap(), r#""editor""#);
    }

    proptest! {
        #[test]
        fn prop_permission_matches_rank_order(role in any_role(), required in any_role()) {
            let expected = role.is_recognized()
                && required.is_recognized()
                && role.rank() >= required.rank();
            prop_assert_eq!(has_permission(&role, &required), expected);
        }

        #[test]
        fn prop_superadmin_satisfies_every_recognized_role(required in any_role()) {
            prop_assert_eq!(Role::Superadmin.satisfies(&required), required.is_recognized());
        }
    }
}
