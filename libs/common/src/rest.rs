//! REST client for the hosted identity/database provider
//!
//! Thin wrapper over `reqwest` that knows the provider's URL layout
//! (`/auth/v1`, `/rest/v1`, `/functions/v1`), attaches the API key and
//! bearer token to every request, and turns error responses into
//! [`TransportError`] values carrying the provider's own message text.

use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::error::{TransportError, TransportResult};

/// Client for the provider's REST surface
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
}

impl RestClient {
    /// Create a new client from provider settings
    pub fn new(config: &ProviderConfig) -> TransportResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self::with_http_client(http, &config.url, &config.anon_key))
    }

    /// Create a client around an existing `reqwest::Client`
    pub fn with_http_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
        anon_key: impl Into<String>,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of an auth endpoint, e.g. `auth_url("token")`
    pub fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// URL of a table exposed through the REST gateway
    pub fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    /// URL of a hosted function
    pub fn functions_url(&self, name: &str) -> String {
        format!("{}/functions/v1/{}", self.base_url, name)
    }

    /// Start a request carrying the API key and a bearer token.
    ///
    /// Without an access token the anonymous key doubles as the bearer,
    /// which is what the provider expects for public endpoints.
    pub fn request(&self, method: Method, url: &str, access_token: Option<&str>) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token.unwrap_or(&self.anon_key))
    }

    /// Send a request and decode a JSON body
    pub async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> TransportResult<T> {
        let response = Self::check(request.send().await?).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Send a request and ignore any body
    pub async fn send_empty(&self, request: RequestBuilder) -> TransportResult<()> {
        Self::check(request.send().await?).await?;
        Ok(())
    }

    /// Check that the auth endpoint is reachable
    pub async fn health_check(&self) -> TransportResult<bool> {
        let url = self.auth_url("health");
        match self.send_empty(self.request(Method::GET, &url, None)).await {
            Ok(()) => Ok(true),
            Err(e) if e.status().is_some() => {
                warn!("Provider health check failed: {}", e);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn check(response: Response) -> TransportResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = extract_error_message(&body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        });
        debug!(status = %status, message = %message, "Provider request failed");

        Err(TransportError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

/// Pull the human-readable message out of a provider error body.
///
/// The auth endpoints answer with `error_description` or `msg`, the REST
/// gateway with `message`, and some edge cases with a bare `error`.
pub fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
        .map(str::to_string)
}
