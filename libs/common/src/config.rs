//! Application configuration
//!
//! Values are layered with the `config` crate: built-in defaults, then an
//! optional `config/default.toml`, then environment variables prefixed with
//! `MEMBERSHIP__` using `__` as the section separator
//! (e.g. `MEMBERSHIP__PROVIDER__ANON_KEY`).

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

const ENV_PREFIX: &str = "MEMBERSHIP";

/// Top-level configuration for the membership front end
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub auth: AuthConfig,
    pub web: WebConfig,
}

/// Hosted identity/database provider connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Project base URL (e.g. "https://xyz.supabase.co")
    pub url: String,
    /// Public anonymous API key sent with every request
    pub anon_key: String,
    /// Per-request timeout in seconds (default: 30)
    pub request_timeout_seconds: u64,
}

impl ProviderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// Session and sign-in flow settings
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// File used to persist the session between runs; memory only when unset
    #[serde(default)]
    pub session_file: Option<String>,
    /// Sign-in entry point unauthenticated visitors are redirected to
    pub sign_in_path: String,
    /// Where to send a user after sign-in when no location was preserved
    pub post_login_redirect: String,
    /// Callback URL handed to the provider for OAuth sign-in
    pub oauth_redirect_url: String,
    /// Link target embedded in password reset emails
    pub password_reset_redirect_url: String,
    pub profile_retry: ProfileRetryConfig,
}

/// Retry policy for passive profile resolution
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileRetryConfig {
    /// Total attempts including the first one (default: 3)
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds (default: 500)
    pub initial_delay_ms: u64,
    /// Upper bound for any single delay in milliseconds (default: 5000)
    pub max_delay_ms: u64,
}

/// HTTP front end settings
#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    /// Socket address to listen on (default: "127.0.0.1:3000")
    pub bind_address: String,
}

impl AppConfig {
    /// Load configuration from `config/default.toml` (optional) and the
    /// environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Some("config/default"))
    }

    /// Load configuration from the environment only
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    fn load_from(file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("provider.url", "")?
            .set_default("provider.anon_key", "")?
            .set_default("provider.request_timeout_seconds", 30_i64)?
            .set_default("auth.sign_in_path", "/login")?
            .set_default("auth.post_login_redirect", "/membership")?
            .set_default(
                "auth.oauth_redirect_url",
                "http://localhost:3000/auth/callback",
            )?
            .set_default(
                "auth.password_reset_redirect_url",
                "http://localhost:3000/auth/update-password",
            )?
            .set_default("auth.profile_retry.max_attempts", 3_i64)?
            .set_default("auth.profile_retry.initial_delay_ms", 500_i64)?
            .set_default("auth.profile_retry.max_delay_ms", 5000_i64)?
            .set_default("web.bind_address", "127.0.0.1:3000")?;

        if let Some(path) = file {
            builder = builder.add_source(File::with_name(path).required(false));
        }

        let config: AppConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.url.trim().is_empty() {
            return Err(ConfigError::Message(format!(
                "{ENV_PREFIX}__PROVIDER__URL must be set"
            )));
        }
        if self.provider.anon_key.trim().is_empty() {
            return Err(ConfigError::Message(format!(
                "{ENV_PREFIX}__PROVIDER__ANON_KEY must be set"
            )));
        }
        if !self.auth.sign_in_path.starts_with('/') {
            return Err(ConfigError::Message(
                "auth.sign_in_path must be an absolute path".to_string(),
            ));
        }
        if self.auth.profile_retry.max_attempts == 0 {
            return Err(ConfigError::Message(
                "auth.profile_retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
