//! Profile lookup and persistence
//!
//! Profiles live in the provider's `profiles` table, keyed by the identity
//! id. Concurrent lookups for the same identity are coalesced by
//! [`SingleFlightResolver`] so a burst of session notifications costs one
//! round trip.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Method;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, instrument};
use uuid::Uuid;

use common::RestClient;

use crate::error::{AuthError, AuthResult};
use crate::models::{NewProfile, UpdateProfile, UserProfile};

const PROFILES_TABLE: &str = "profiles";

/// Fetches the profile record for an identity
#[async_trait]
pub trait ProfileResolver: Send + Sync {
    /// Fetch the profile for `user_id`; a missing row is `AuthError::NotFound`
    async fn resolve(&self, user_id: Uuid, access_token: &str) -> AuthResult<UserProfile>;
}

/// Creates and edits profile records
#[async_trait]
pub trait ProfileWriter: Send + Sync {
    /// Upsert a profile. Without a token the request runs with the
    /// anonymous key, as it does right after a sign-up awaiting confirmation.
    async fn create(&self, profile: &NewProfile, access_token: Option<&str>)
        -> AuthResult<UserProfile>;

    async fn update(
        &self,
        user_id: Uuid,
        changes: &UpdateProfile,
        access_token: &str,
    ) -> AuthResult<UserProfile>;
}

/// Profile access over the provider's REST gateway
#[derive(Clone)]
pub struct RestProfileClient {
    client: RestClient,
}

impl RestProfileClient {
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }

    fn first_row(user_id: Uuid, rows: Vec<UserProfile>) -> AuthResult<UserProfile> {
        rows.into_iter().next().ok_or(AuthError::NotFound(user_id))
    }
}

#[async_trait]
impl ProfileResolver for RestProfileClient {
    #[instrument(skip(self, access_token))]
    async fn resolve(&self, user_id: Uuid, access_token: &str) -> AuthResult<UserProfile> {
        let url = format!(
            "{}?id=eq.{}&select=*",
            self.client.rest_url(PROFILES_TABLE),
            user_id
        );
        let request = self.client.request(Method::GET, &url, Some(access_token));
        let rows: Vec<UserProfile> = self.client.send_json(request).await?;
        Self::first_row(user_id, rows)
    }
}

#[async_trait]
impl ProfileWriter for RestProfileClient {
    #[instrument(skip(self, profile, access_token), fields(user_id = %profile.id))]
    async fn create(
        &self,
        profile: &NewProfile,
        access_token: Option<&str>,
    ) -> AuthResult<UserProfile> {
        let url = self.client.rest_url(PROFILES_TABLE);
        let request = self
            .client
            .request(Method::POST, &url, access_token)
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&[profile]);
        let rows: Vec<UserProfile> = self.client.send_json(request).await?;
        Self::first_row(profile.id, rows)
    }

    #[instrument(skip(self, changes, access_token))]
    async fn update(
        &self,
        user_id: Uuid,
        changes: &UpdateProfile,
        access_token: &str,
    ) -> AuthResult<UserProfile> {
        let url = format!("{}?id=eq.{}", self.client.rest_url(PROFILES_TABLE), user_id);
        let request = self
            .client
            .request(Method::PATCH, &url, Some(access_token))
            .header("Prefer", "return=representation")
            .json(changes);
        let rows: Vec<UserProfile> = self.client.send_json(request).await?;
        Self::first_row(user_id, rows)
    }
}

type InFlight = Shared<BoxFuture<'static, AuthResult<UserProfile>>>;

/// Coalesces concurrent lookups for the same identity into one request
pub struct SingleFlightResolver {
    inner: Arc<dyn ProfileResolver>,
    in_flight: Arc<Mutex<HashMap<Uuid, InFlight>>>,
}

impl SingleFlightResolver {
    pub fn new(inner: Arc<dyn ProfileResolver>) -> Self {
        Self {
            inner,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of lookups currently on the wire
    pub fn in_flight(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[async_trait]
impl ProfileResolver for SingleFlightResolver {
    async fn resolve(&self, user_id: Uuid, access_token: &str) -> AuthResult<UserProfile> {
        let fetch = {
            let mut in_flight = self
                .in_flight
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());

            match in_flight.get(&user_id) {
                Some(fetch) => {
                    debug!(%user_id, "Joining in-flight profile lookup");
                    fetch.clone()
                }
                None => {
                    let inner = Arc::clone(&self.inner);
                    let registry = Arc::clone(&self.in_flight);
                    let token = access_token.to_string();
                    let fetch: InFlight = async move {
                        let result = inner.resolve(user_id, &token).await;
                        registry
                            .lock()
                            .unwrap_or_else(|poisoned| poisoned.into_inner())
                            .remove(&user_id);
                        result
                    }
                    .boxed()
                    .shared();
                    in_flight.insert(user_id, fetch.clone());
                    fetch
                }
            }
        };

        fetch.await
    }
}
