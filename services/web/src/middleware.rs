//! Role guard for protected routes
//!
//! Renders the access guard's decision: waiting states answer 503 with a
//! `Retry-After` hint, visitors without a session are redirected to sign in
//! and insufficient roles get a 403 naming both roles. A browser that does
//! not hold the session cookie is judged as signed out.

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde_json::json;

use auth::{evaluate, AuthState, GuardDecision, Role};

use crate::state::AppState;

/// Seconds a client should wait before asking again while state loads
const RETRY_AFTER_SECONDS: &str = "1";

/// Guard for member pages
pub async fn require_user(State(state): State<AppState>, req: Request, next: Next) -> Response {
    guard(&state, Role::User, req, next).await
}

/// Guard for the administration area
pub async fn require_superadmin(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    guard(&state, Role::Superadmin, req, next).await
}

async fn guard(state: &AppState, required: Role, req: Request, next: Next) -> Response {
    let location = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let jar = CookieJar::from_headers(req.headers());
    let decision = if state.owner.is_owner(&jar) {
        state.guard.check(&required, &location)
    } else {
        let anonymous = AuthState {
            loading: state.auth.state().loading,
            ..AuthState::default()
        };
        evaluate(&anonymous, &required, state.guard.sign_in_path(), &location)
    };

    match decision {
        GuardDecision::Authorized => next.run(req).await,
        decision => render(decision),
    }
}

/// Response for every decision other than `Authorized`
pub fn render(decision: GuardDecision) -> Response {
    match decision {
        GuardDecision::Loading => waiting("loading"),
        GuardDecision::ProfilePending => waiting("profile_pending"),
        GuardDecision::ProfileUnavailable { message } => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "profile_unavailable",
                "error": message,
                "retry": "/auth/profile/reload",
            })),
        )
            .into_response(),
        GuardDecision::Redirect { to } => Redirect::to(&to).into_response(),
        ref denied @ GuardDecision::Denied {
            ref current,
            ref required,
        } => (
            StatusCode::FORBIDDEN,
            Json(json!({
                "error": denied.denial_message(),
                "current_role": current,
                "required_role": required,
            })),
        )
            .into_response(),
        GuardDecision::Authorized => StatusCode::NO_CONTENT.into_response(),
    }
}

fn waiting(status: &'static str) -> Response {
    let mut response = (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "status": status })),
    )
        .into_response();
    response.headers_mut().insert(
        header::RETRY_AFTER,
        HeaderValue::from_static(RETRY_AFTER_SECONDS),
    );
    response
}
