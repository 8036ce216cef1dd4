//! Integration tests for the REST identity provider
//!
//! A local axum server plays the hosted auth API.

use axum::{
    extract::Query,
    http::StatusCode,
    routing::{post, put},
    Json, Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use auth::models::{Session, UserIdentity, UserMetadata};
use auth::provider::{
    AuthChangeEvent, IdentityProvider, MemorySessionStorage, SessionStorage, SignUpRequest,
    SupabaseAuthProvider, UserAttributes,
};
use auth::{AuthError, OAuthProvider};
use common::RestClient;

const USER_ID: &str = "6f0c5a84-3a43-4c55-9d68-2f4b4f1f4a11";

fn user_body() -> Value {
    json!({
        "id": USER_ID,
        "email": "ada@example.com",
        "user_metadata": { "first_name": "Ada", "last_name": "Lovelace" }
    })
}

fn token_body(access_token: &str) -> Value {
    json!({
        "access_token": access_token,
        "refresh_token": format!("{access_token}-refresh"),
        "token_type": "bearer",
        "expires_in": 3600,
        "user": user_body(),
    })
}

fn rejected(message: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "invalid_grant", "error_description": message })),
    )
}

async fn token(
    Query(params): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    match params.get("grant_type").map(String::as_str) {
        Some("password") => {
            if body["email"] == "ada@example.com" && body["password"] == "secret1" {
                (StatusCode::OK, Json(token_body("password-token")))
            } else {
                rejected("Invalid login credentials")
            }
        }
        Some("refresh_token") => {
            if body["refresh_token"] == "good-refresh" {
                (StatusCode::OK, Json(token_body("refreshed-token")))
            } else {
                rejected("Invalid Refresh Token: Refresh Token Not Found")
            }
        }
        Some("pkce") => {
            let verifier = body["code_verifier"].as_str().unwrap_or_default();
            if body["auth_code"] == "code-123" && !verifier.is_empty() {
                (StatusCode::OK, Json(token_body("pkce-token")))
            } else {
                rejected("invalid flow state")
            }
        }
        _ => rejected("unsupported_grant_type"),
    }
}

async fn spawn_fake_auth() -> String {
    let app = Router::new()
        .route("/auth/v1/token", post(token))
        .route("/auth/v1/logout", post(|| async { StatusCode::NO_CONTENT }))
        .route("/auth/v1/signup", post(|| async { Json(user_body()) }))
        .route(
            "/auth/v1/recover",
            post(|Query(params): Query<HashMap<String, String>>| async move {
                if params.contains_key("redirect_to") {
                    (StatusCode::OK, Json(json!({})))
                } else {
                    (StatusCode::BAD_REQUEST, Json(json!({ "msg": "missing redirect" })))
                }
            }),
        )
        .route(
            "/auth/v1/user",
            put(|Json(body): Json<Value>| async move {
                let mut user = user_body();
                if let Some(data) = body.get("data") {
                    user["user_metadata"] = data.clone();
                }
                Json(user)
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

struct Fixture {
    provider: SupabaseAuthProvider,
    storage: Arc<MemorySessionStorage>,
    events: Arc<Mutex<Vec<AuthChangeEvent>>>,
    _subscription: common::Subscription,
}

async fn fixture() -> Fixture {
    let base_url = spawn_fake_auth().await;
    let client = RestClient::with_http_client(reqwest::Client::new(), base_url, "anon-key");
    let storage = Arc::new(MemorySessionStorage::default());
    let provider = SupabaseAuthProvider::new(client, storage.clone());

    let events = Arc::new(Mutex::new(Vec::new()));
    let recorded = events.clone();
    let subscription = provider.on_auth_state_change(Box::new(move |change| {
        recorded.lock().unwrap().push(change.event);
    }));

    Fixture {
        provider,
        storage,
        events,
        _subscription: subscription,
    }
}

fn stored_session(access_token: &str, refresh_token: &str, expires_in_minutes: i64) -> Session {
    Session {
        access_token: access_token.to_string(),
        refresh_token: refresh_token.to_string(),
        expires_at: Utc::now() + Duration::minutes(expires_in_minutes),
        user: UserIdentity {
            id: USER_ID.parse().unwrap(),
            email: Some("ada@example.com".to_string()),
            metadata: UserMetadata::default(),
        },
    }
}

#[tokio::test]
async fn test_password_sign_in_persists_and_notifies() {
    let f = fixture().await;

    let session = f
        .provider
        .sign_in_with_password("ada@example.com", "secret1")
        .await
        .unwrap();

    assert_eq!(session.access_token, "password-token");
    assert_eq!(session.user.metadata.first_name.as_deref(), Some("Ada"));
    assert!(!session.is_expired());
    assert_eq!(f.storage.load().unwrap(), Some(session));
    assert_eq!(*f.events.lock().unwrap(), vec![AuthChangeEvent::SignedIn]);
}

#[tokio::test]
async fn test_rejected_password_is_unauthorized_with_provider_message() {
    let f = fixture().await;

    let error = f
        .provider
        .sign_in_with_password("ada@example.com", "nope")
        .await
        .unwrap_err();

    assert_eq!(
        error,
        AuthError::Unauthorized("Invalid login credentials".to_string())
    );
    assert!(f.events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_expired_session_is_refreshed() {
    let f = fixture().await;
    f.storage
        .save(&stored_session("stale", "good-refresh", -1))
        .unwrap();

    let session = f.provider.get_session().await.unwrap().unwrap();

    assert_eq!(session.access_token, "refreshed-token");
    assert_eq!(f.storage.load().unwrap(), Some(session));
    assert_eq!(*f.events.lock().unwrap(), vec![AuthChangeEvent::TokenRefreshed]);
}

#[tokio::test]
async fn test_rejected_refresh_clears_session() {
    let f = fixture().await;
    f.storage
        .save(&stored_session("stale", "revoked", -1))
        .unwrap();

    assert_eq!(f.provider.get_session().await.unwrap(), None);
    assert_eq!(f.storage.load().unwrap(), None);
    assert_eq!(*f.events.lock().unwrap(), vec![AuthChangeEvent::SignedOut]);
}

#[tokio::test]
async fn test_valid_session_is_returned_without_refresh() {
    let f = fixture().await;
    let stored = stored_session("fresh", "good-refresh", 30);
    f.storage.save(&stored).unwrap();

    assert_eq!(f.provider.get_session().await.unwrap(), Some(stored));
    assert!(f.events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_sign_out_notifies_once() {
    let f = fixture().await;
    f.provider
        .sign_in_with_password("ada@example.com", "secret1")
        .await
        .unwrap();

    f.provider.sign_out().await.unwrap();
    f.provider.sign_out().await.unwrap();

    assert_eq!(f.storage.load().unwrap(), None);
    assert_eq!(
        *f.events.lock().unwrap(),
        vec![AuthChangeEvent::SignedIn, AuthChangeEvent::SignedOut]
    );
}

#[tokio::test]
async fn test_oauth_code_exchange_needs_started_sign_in() {
    let f = fixture().await;

    assert!(matches!(
        f.provider.exchange_code_for_session("code-123").await,
        Err(AuthError::InvalidOAuthState(_))
    ));

    let start = f
        .provider
        .sign_in_with_oauth(OAuthProvider::Google, "http://localhost:3000/auth/callback")
        .await
        .unwrap();
    assert!(start.url.contains("/auth/v1/authorize?provider=google"));
    assert!(start.url.contains("code_challenge_method=s256"));

    let session = f.provider.exchange_code_for_session("code-123").await.unwrap();
    assert_eq!(session.access_token, "pkce-token");

    // The verifier is single use
    assert!(matches!(
        f.provider.exchange_code_for_session("code-123").await,
        Err(AuthError::InvalidOAuthState(_))
    ));
}

#[tokio::test]
async fn test_sign_up_awaiting_confirmation_has_no_session() {
    let f = fixture().await;

    let outcome = f
        .provider
        .sign_up(&SignUpRequest {
            email: "ada@example.com".to_string(),
            password: "secret1".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(outcome.user.id.to_string(), USER_ID);
    assert!(outcome.session.is_none());
    assert!(f.events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_update_user_requires_session_and_refreshes_stored_identity() {
    let f = fixture().await;
    let attributes = UserAttributes {
        data: Some(UserMetadata {
            first_name: Some("Augusta".to_string()),
            ..UserMetadata::default()
        }),
        ..UserAttributes::default()
    };

    assert_eq!(
        f.provider.update_user(&attributes).await.unwrap_err(),
        AuthError::NotSignedIn
    );

    f.provider
        .sign_in_with_password("ada@example.com", "secret1")
        .await
        .unwrap();
    let user = f.provider.update_user(&attributes).await.unwrap();

    assert_eq!(user.metadata.first_name.as_deref(), Some("Augusta"));
    let stored = f.storage.load().unwrap().unwrap();
    assert_eq!(stored.user, user);
    assert_eq!(
        f.events.lock().unwrap().last(),
        Some(&AuthChangeEvent::UserUpdated)
    );
}

#[tokio::test]
async fn test_password_reset_sends_redirect() {
    let f = fixture().await;
    f.provider
        .reset_password_for_email("ada@example.com", "http://localhost:3000/auth/update-password")
        .await
        .unwrap();
}
