//! Web front end routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use auth::models::UpdateProfile;
use auth::validation::SignUpForm;
use auth::{AuthError, AuthState, OAuthProvider, UserProfile};

use crate::{
    error::{WebError, WebResult},
    middleware::{require_superadmin, require_user},
    state::AppState,
};

/// Create the router for the web front end
pub fn create_router(state: AppState) -> Router {
    let member_routes = Router::new()
        .route("/membership", get(membership))
        .route("/chat/conversations", get(list_conversations))
        .route("/chat/conversations/new", post(new_conversation))
        .route(
            "/chat/conversations/:id",
            get(open_conversation)
                .patch(rename_conversation)
                .delete(delete_conversation),
        )
        .route("/chat/messages", post(send_message))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_user));

    let admin_routes = Router::new()
        .route("/admin", get(admin))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_superadmin,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/auth/state", get(auth_state))
        .route("/auth/login", post(login))
        .route("/auth/register", post(register))
        .route("/auth/logout", post(logout))
        .route("/auth/reset-password", post(reset_password))
        .route("/auth/update-password", post(update_password))
        .route("/auth/profile", post(update_profile))
        .route("/auth/profile/reload", post(reload_profile))
        .route("/auth/oauth/:provider", get(start_oauth))
        .route("/auth/callback", get(oauth_callback))
        .merge(member_routes)
        .merge(admin_routes)
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let provider = match state.provider.health_check().await {
        Ok(true) => "ok",
        Ok(false) => "degraded",
        Err(e) => {
            tracing::warn!("Provider unreachable: {}", e);
            "unreachable"
        }
    };

    Json(json!({
        "status": "ok",
        "service": "membership-web",
        "provider": provider,
    }))
}

/// Authentication state without any token material
#[derive(Debug, Serialize)]
pub struct AuthStateView {
    pub loading: bool,
    pub authenticated: bool,
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
    pub profile: Option<UserProfile>,
    pub profile_error: Option<String>,
}

impl From<AuthState> for AuthStateView {
    fn from(state: AuthState) -> Self {
        Self {
            loading: state.loading,
            authenticated: state.is_authenticated(),
            user_id: state.user_id(),
            email: state.session.and_then(|s| s.user.email),
            profile: state.profile,
            profile_error: state.profile_error,
        }
    }
}

/// Other browsers see the signed-out view
pub async fn auth_state(State(state): State<AppState>, jar: CookieJar) -> Json<AuthStateView> {
    let current = state.auth.state();
    if state.owner.is_owner(&jar) {
        return Json(current.into());
    }
    Json(
        AuthState {
            loading: current.loading,
            ..AuthState::default()
        }
        .into(),
    )
}

/// Reject requests from a browser that does not hold the session
fn require_owner(state: &AppState, jar: &CookieJar) -> WebResult<()> {
    if state.owner.is_owner(jar) {
        Ok(())
    } else {
        Err(AuthError::NotSignedIn.into())
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    /// Location preserved by the guard's sign-in redirect
    #[serde(default)]
    pub redirect: Option<String>,
}

/// Only same-site paths are followed after sign-in
fn local_redirect(target: Option<&str>, fallback: &str) -> String {
    match target {
        Some(path) if is_same_site_path(path) => path.to_string(),
        _ => fallback.to_string(),
    }
}

/// Browsers read `\` as `/`, so `/\host` leaves the site like `//host` does
fn is_same_site_path(path: &str) -> bool {
    path.starts_with('/')
        && !path.starts_with("//")
        && !path.contains('\\')
        && !path.chars().any(char::is_control)
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> WebResult<impl IntoResponse> {
    let signed_in = state.auth.sign_in(&payload.email, &payload.password).await?;
    let redirect = local_redirect(payload.redirect.as_deref(), &state.post_login_redirect);

    Ok((
        state.owner.claim(jar),
        Json(json!({
            "user_id": signed_in.session.subject(),
            "profile": signed_in.profile,
            "redirect": redirect,
        })),
    ))
}

pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(form): Json<SignUpForm>,
) -> WebResult<impl IntoResponse> {
    let user = state.auth.sign_up(&form).await?;
    let signed_in = state.auth.state().user_id() == Some(user.id);
    let jar = if signed_in { state.owner.claim(jar) } else { jar };

    Ok((
        StatusCode::CREATED,
        jar,
        Json(json!({
            "user_id": user.id,
            "email": user.email,
            "signed_in": signed_in,
        })),
    ))
}

pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> WebResult<(CookieJar, StatusCode)> {
    require_owner(&state, &jar)?;
    let jar = state.owner.release(jar);
    state.auth.sign_out().await?;
    Ok((jar, StatusCode::NO_CONTENT))
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> WebResult<impl IntoResponse> {
    state.auth.reset_password(&payload.email).await?;
    Ok(Json(json!({
        "message": "Check your email for a link to reset your password"
    })))
}

#[derive(Debug, Deserialize)]
pub struct UpdatePasswordRequest {
    pub password: String,
    pub confirm_password: String,
}

pub async fn update_password(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<UpdatePasswordRequest>,
) -> WebResult<StatusCode> {
    require_owner(&state, &jar)?;
    state
        .auth
        .update_password(&payload.password, &payload.confirm_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_profile(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(changes): Json<UpdateProfile>,
) -> WebResult<Json<UserProfile>> {
    require_owner(&state, &jar)?;
    Ok(Json(state.auth.update_profile(&changes).await?))
}

/// Explicit retry after passive profile resolution gave up
pub async fn reload_profile(
    State(state): State<AppState>,
    jar: CookieJar,
) -> WebResult<Json<UserProfile>> {
    require_owner(&state, &jar)?;
    Ok(Json(state.auth.reload_profile().await?))
}

pub async fn start_oauth(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> WebResult<Redirect> {
    let provider: OAuthProvider = provider.parse()?;
    let start = state.auth.sign_in_with_oauth(provider, None).await?;
    Ok(Redirect::to(&start.url))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
}

pub async fn oauth_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> WebResult<(CookieJar, Redirect)> {
    let code = query.code.unwrap_or_default();
    state.auth.complete_oauth(&code).await?;
    Ok((
        state.owner.claim(jar),
        Redirect::to(&state.post_login_redirect),
    ))
}

/// Member landing page
pub async fn membership(State(state): State<AppState>) -> WebResult<impl IntoResponse> {
    let profile = state
        .auth
        .state()
        .profile
        .ok_or(WebError::Auth(AuthError::NotSignedIn))?;

    Ok(Json(json!({
        "message": format!("Welcome, {}", profile.display_name()),
        "profile": profile,
    })))
}

/// Administration area
pub async fn admin(State(state): State<AppState>) -> impl IntoResponse {
    let name = state
        .auth
        .state()
        .profile
        .map(|p| p.display_name())
        .unwrap_or_default();

    Json(json!({
        "message": format!("Administration area for {name}"),
    }))
}

pub async fn list_conversations(State(state): State<AppState>) -> WebResult<impl IntoResponse> {
    let conversations = state.chat.load_conversations().await?;
    Ok(Json(json!({
        "conversations": conversations,
        "current_conversation_id": state.chat.store().snapshot().current_conversation_id,
    })))
}

/// Leave the current conversation; the next message starts a new one
pub async fn new_conversation(State(state): State<AppState>) -> StatusCode {
    state.chat.start_new_conversation();
    StatusCode::NO_CONTENT
}

pub async fn open_conversation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let messages = state.chat.select_conversation(id).await?;
    Ok(Json(json!({
        "conversation": state.chat.store().conversation(id),
        "messages": messages,
    })))
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub title: String,
}

pub async fn rename_conversation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RenameRequest>,
) -> WebResult<impl IntoResponse> {
    let conversation = state.chat.rename_conversation(id, &payload.title).await?;
    Ok(Json(conversation))
}

pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<StatusCode> {
    state.chat.delete_conversation(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

pub async fn send_message(
    State(state): State<AppState>,
    Json(payload): Json<SendMessageRequest>,
) -> WebResult<impl IntoResponse> {
    let sent = state.chat.send_message(&payload.content).await?;
    Ok(Json(sent))
}
