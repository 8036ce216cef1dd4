//! Integration tests for the provider REST client
//!
//! A local axum server stands in for the hosted provider so the tests
//! exercise real HTTP round trips.

use axum::{
    Json, Router,
    http::{HeaderMap, StatusCode},
    routing::get,
};
use common::{RestClient, TransportError};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;

async fn spawn_fake_provider() -> String {
    let app = Router::new()
        .route("/auth/v1/health", get(|| async { StatusCode::OK }))
        .route(
            "/rest/v1/profiles",
            get(|headers: HeaderMap| async move {
                let api_key = headers
                    .get("apikey")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                let bearer = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();

                if bearer == "Bearer expired" {
                    return (
                        StatusCode::UNAUTHORIZED,
                        Json(json!({ "message": "JWT expired" })),
                    );
                }

                (
                    StatusCode::OK,
                    Json(json!([{ "api_key": api_key, "bearer": bearer }])),
                )
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

#[derive(Debug, Deserialize)]
struct EchoedHeaders {
    api_key: String,
    bearer: String,
}

#[tokio::test]
async fn test_health_check_against_local_provider() -> Result<(), Box<dyn std::error::Error>> {
    let base_url = spawn_fake_provider().await;
    let client = RestClient::with_http_client(reqwest::Client::new(), base_url, "anon-key");

    assert!(client.health_check().await?, "provider health check failed");
    Ok(())
}

#[tokio::test]
async fn test_requests_carry_api_key_and_bearer() -> Result<(), Box<dyn std::error::Error>> {
    let base_url = spawn_fake_provider().await;
    let client = RestClient::with_http_client(reqwest::Client::new(), base_url, "anon-key");

    let url = client.rest_url("profiles");
    let rows: Vec<EchoedHeaders> = client
        .send_json(client.request(Method::GET, &url, Some("user-token")))
        .await?;
    assert_eq!(rows[0].api_key, "anon-key");
    assert_eq!(rows[0].bearer, "Bearer user-token");

    // Without a user token the anonymous key is the bearer
    let rows: Vec<EchoedHeaders> = client
        .send_json(client.request(Method::GET, &url, None))
        .await?;
    assert_eq!(rows[0].bearer, "Bearer anon-key");

    Ok(())
}

#[tokio::test]
async fn test_error_body_message_is_preserved() {
    let base_url = spawn_fake_provider().await;
    let client = RestClient::with_http_client(reqwest::Client::new(), base_url, "anon-key");

    let url = client.rest_url("profiles");
    let result: Result<serde_json::Value, _> = client
        .send_json(client.request(Method::GET, &url, Some("expired")))
        .await;

    assert_eq!(
        result.unwrap_err(),
        TransportError::Status {
            status: 401,
            message: "JWT expired".to_string(),
        }
    );
}

#[tokio::test]
async fn test_unreachable_provider_is_transient() {
    let client =
        RestClient::with_http_client(reqwest::Client::new(), "http://127.0.0.1:9", "anon-key");

    let error = client.health_check().await.unwrap_err();
    assert!(error.is_transient());
}
