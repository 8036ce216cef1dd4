//! Input validation for the sign-in, sign-up and password forms
//!
//! Everything here runs before any remote call is made.

use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

use crate::error::{AuthError, AuthResult};

/// Shortest password the provider accepts
const MIN_PASSWORD_LENGTH: usize = 6;
/// Longest password the provider hashes without truncation
const MAX_PASSWORD_LENGTH: usize = 72;
const MAX_NAME_LENGTH: usize = 50;

/// Validate email
pub fn validate_email(email: &str) -> Result<(), String> {
    let email = email.trim();
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email must be at most 254 characters long".to_string());
    }

    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("Failed to compile email regex")
    });

    if !regex.is_match(email) {
        return Err("Invalid email format".to_string());
    }

    Ok(())
}

/// Validate password
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }

    let length = password.chars().count();
    if length < MIN_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters long"
        ));
    }

    if length > MAX_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at most {MAX_PASSWORD_LENGTH} characters long"
        ));
    }

    Ok(())
}

/// Validate a first or last name
pub fn validate_name(label: &str, name: &str) -> Result<(), String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("{label} is required"));
    }

    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(format!(
            "{label} must be at most {MAX_NAME_LENGTH} characters long"
        ));
    }

    Ok(())
}

/// Check the sign-in form: both fields present, email well formed.
///
/// Password strength is not checked here; the provider decides whether the
/// credentials are valid.
pub fn validate_credentials(email: &str, password: &str) -> AuthResult<()> {
    validate_email(email).map_err(AuthError::Validation)?;
    if password.is_empty() {
        return Err(AuthError::Validation("Password is required".to_string()));
    }
    Ok(())
}

/// Check a new password and its confirmation
pub fn validate_password_change(password: &str, confirm_password: &str) -> AuthResult<()> {
    validate_password(password).map_err(AuthError::Validation)?;
    if password != confirm_password {
        return Err(AuthError::Validation("Passwords do not match".to_string()));
    }
    Ok(())
}

/// Registration form as submitted by the user
#[derive(Debug, Clone, Deserialize)]
pub struct SignUpForm {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub first_name: String,
    pub last_name: String,
}

impl SignUpForm {
    /// Check every client-side invariant of the form
    pub fn validate(&self) -> AuthResult<()> {
        validate_email(&self.email).map_err(AuthError::Validation)?;
        validate_password_change(&self.password, &self.confirm_password)?;
        validate_name("First name", &self.first_name).map_err(AuthError::Validation)?;
        validate_name("Last name", &self.last_name).map_err(AuthError::Validation)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(password: &str, confirm_password: &str) -> SignUpForm {
        SignUpForm {
            email: "ada@example.com".to_string(),
            password: password.to_string(),
            confirm_password: confirm_password.to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
        }
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("ada@example.com").is_ok());
        assert!(validate_email("  ada@example.com ").is_ok());
        assert_eq!(validate_email(""), Err("Email is required".to_string()));
        assert_eq!(
            validate_email("ada@example"),
            Err("Invalid email format".to_string())
        );
    }

    #[test]
    fn test_validate_password_length() {
        assert!(validate_password("abc123").is_ok());
        assert_eq!(
            validate_password("abc"),
            Err("Password must be at least 6 characters long".to_string())
        );
        assert!(validate_password(&"x".repeat(73)).is_err());
    }

    #[test]
    fn test_mismatched_passwords_are_rejected() {
        assert_eq!(
            form("abc123", "xyz789").validate(),
            Err(AuthError::Validation("Passwords do not match".to_string()))
        );
    }

    #[test]
    fn test_valid_form_passes() {
        assert!(form("abc123", "abc123").validate().is_ok());
    }

    #[test]
    fn test_names_are_required() {
        let mut form = form("abc123", "abc123");
        form.last_name = "   ".to_string();
        assert_eq!(
            form.validate(),
            Err(AuthError::Validation("Last name is required".to_string()))
        );
    }

    #[test]
    fn test_validate_credentials() {
        assert!(validate_credentials("ada@example.com", "anything").is_ok());
        assert_eq!(
            validate_credentials("ada@example.com", ""),
            Err(AuthError::Validation("Password is required".to_string()))
        );
    }
}
