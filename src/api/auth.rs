//! Account and session endpoints proxied to the identity provider.

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::HeaderMap,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use url::Url;

use super::error::{ApiError, ResultExt, require};
use crate::auth::{
    ApiSession, MaybeSession, append_cleared_cookies, append_session_cookies, sign_out,
};
use crate::impl_has_session_backend;
use crate::pages::confirm_url;
use crate::provider::{AuthSession, IdentityProvider, SignUpMetadata, User};
use crate::rate_limit::{
    RateLimitConfig, rate_limit_login, rate_limit_password_reset, rate_limit_signup,
};

#[derive(Clone)]
pub struct AuthState {
    pub provider: Arc<dyn IdentityProvider>,
    pub secure_cookies: bool,
    pub site_url: Url,
    pub rate_limit_config: Arc<RateLimitConfig>,
}

impl_has_session_backend!(AuthState);

pub fn router(state: AuthState) -> Router {
    let login_router = Router::new()
        .route("/login", post(login))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_login,
        ));

    let signup_router = Router::new()
        .route("/signup", post(signup))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_signup,
        ));

    let reset_router = Router::new()
        .route("/forgot-password", post(forgot_password))
        .route("/update-password", post(update_password))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_password_reset,
        ));

    let session_router = Router::new()
        .route("/logout", post(logout))
        .route("/session", get(session))
        .with_state(state);

    Router::new()
        .merge(login_router)
        .merge(signup_router)
        .merge(reset_router)
        .merge(session_router)
}

/// Parse a JSON body, mapping any body error to a 400.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| ApiError::bad_request(e.body_text()))
}

#[derive(Serialize)]
struct UserBody {
    id: String,
    email: Option<String>,
}

impl From<User> for UserBody {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
        }
    }
}

#[derive(Serialize)]
struct UserResponse {
    user: UserBody,
}

/// `{user}` body, plus session cookies when the provider issued a session.
fn user_response(auth: AuthSession, secure: bool) -> Response {
    let mut response = Json(UserResponse {
        user: auth.user.into(),
    })
    .into_response();
    if let Some(tokens) = &auth.session {
        append_session_cookies(response.headers_mut(), tokens, secure);
    }
    response
}

fn ok() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

#[derive(Deserialize)]
struct SignUpRequest {
    email: Option<String>,
    password: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
}

async fn signup(
    State(state): State<AuthState>,
    payload: Result<Json<SignUpRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let payload = body(payload)?;
    let email = require(payload.email.as_deref(), "email and password are required")?.trim();
    let password = require(payload.password.as_deref(), "email and password are required")?;

    let metadata = SignUpMetadata {
        first_name: payload.first_name.filter(|s| !s.trim().is_empty()),
        last_name: payload.last_name.filter(|s| !s.trim().is_empty()),
    };

    let auth = state
        .provider
        .sign_up(email, password, &metadata)
        .await
        .or_bad_request("Sign-up failed")?;

    info!(user = %auth.user.id, "Account created");
    Ok(user_response(auth, state.secure_cookies))
}

#[derive(Deserialize)]
struct LoginRequest {
    email: Option<String>,
    password: Option<String>,
}

async fn login(
    State(state): State<AuthState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let payload = body(payload)?;
    let email = require(payload.email.as_deref(), "email and password are required")?.trim();
    let password = require(payload.password.as_deref(), "email and password are required")?;

    let auth = state
        .provider
        .sign_in_with_password(email, password)
        .await
        .or_unauthorized("Sign-in failed")?;

    info!(user = %auth.user.id, "Signed in");
    Ok(user_response(auth, state.secure_cookies))
}

/// Always succeeds: the provider is told when possible, the cookies are
/// cleared regardless.
async fn logout(State(state): State<AuthState>, headers: HeaderMap) -> Response {
    sign_out(state.provider.as_ref(), &headers).await;

    let mut response = ok().into_response();
    append_cleared_cookies(response.headers_mut());
    response
}

#[derive(Deserialize)]
struct ForgotPasswordRequest {
    email: Option<String>,
}

async fn forgot_password(
    State(state): State<AuthState>,
    payload: Result<Json<ForgotPasswordRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = body(payload)?;
    let email = require(payload.email.as_deref(), "email is required")?.trim();

    state
        .provider
        .reset_password_for_email(email, &confirm_url(&state.site_url))
        .await
        .or_bad_request("Password reset failed")?;

    Ok(ok())
}

#[derive(Deserialize)]
struct UpdatePasswordRequest {
    password: Option<String>,
}

async fn update_password(
    State(state): State<AuthState>,
    ApiSession(user): ApiSession,
    payload: Result<Json<UpdatePasswordRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = body(payload)?;
    let password = require(payload.password.as_deref(), "password is required")?;

    state
        .provider
        .update_password(&user.access_token, password)
        .await
        .or_bad_request("Password update failed")?;

    info!(user = %user.user_id(), "Password updated");
    Ok(ok())
}

#[derive(Serialize)]
struct SessionResponse {
    authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<UserBody>,
}

async fn session(MaybeSession(user): MaybeSession) -> Json<SessionResponse> {
    Json(SessionResponse {
        authenticated: user.is_some(),
        user: user.map(|u| UserBody {
            id: u.claims.sub,
            email: u.claims.email,
        }),
    })
}
