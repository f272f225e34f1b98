//! Server-rendered pages: auth forms and the protected dashboard.

mod auth;
mod dashboard;
pub mod html;

use axum::{
    Router, middleware,
    response::Redirect,
    routing::{get, post},
};
use std::sync::Arc;
use url::Url;

use crate::impl_has_session_backend;
use crate::provider::IdentityProvider;
use crate::rate_limit::{
    RateLimitConfig, rate_limit_login, rate_limit_password_reset, rate_limit_signup,
};

pub const DASHBOARD_PATH: &str = "/protected";
pub const SIGN_UP_SUCCESS_PATH: &str = "/auth/sign-up-success";
pub const UPDATE_PASSWORD_PATH: &str = "/auth/update-password";
pub const CONFIRM_PATH: &str = "/auth/confirm";

/// Absolute link sent in password reset emails. The provider appends
/// `token_hash` and `type`; the confirm route turns them into a session.
pub fn confirm_url(site_url: &Url) -> String {
    site_url
        .join(CONFIRM_PATH)
        .map(String::from)
        .unwrap_or_else(|_| CONFIRM_PATH.to_string())
}

#[derive(Clone)]
pub struct PagesState {
    pub provider: Arc<dyn IdentityProvider>,
    pub secure_cookies: bool,
    pub site_url: Url,
    pub rate_limit_config: Arc<RateLimitConfig>,
}

impl_has_session_backend!(PagesState);

/// Create the page router.
pub fn create_pages_router(state: PagesState) -> Router {
    let limits = state.rate_limit_config.clone();

    let login_router = Router::new()
        .route("/auth/login", post(auth::login_submit))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(limits.clone(), rate_limit_login));

    let signup_router = Router::new()
        .route("/auth/sign-up", post(auth::sign_up_submit))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(limits.clone(), rate_limit_signup));

    let reset_router = Router::new()
        .route("/auth/forgot-password", post(auth::forgot_password_submit))
        .route(UPDATE_PASSWORD_PATH, post(auth::update_password_submit))
        .route(CONFIRM_PATH, get(auth::confirm))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            limits,
            rate_limit_password_reset,
        ));

    let open_router = Router::new()
        .route("/", get(Redirect::temporary(DASHBOARD_PATH)))
        .route("/auth/login", get(auth::login_page))
        .route("/auth/sign-up", get(auth::sign_up_page))
        .route(SIGN_UP_SUCCESS_PATH, get(auth::sign_up_success_page))
        .route("/auth/forgot-password", get(auth::forgot_password_page))
        .route(UPDATE_PASSWORD_PATH, get(auth::update_password_page))
        .route("/auth/sign-out", post(dashboard::sign_out_action))
        .route(DASHBOARD_PATH, get(dashboard::dashboard))
        .with_state(state);

    Router::new()
        .merge(login_router)
        .merge(signup_router)
        .merge(reset_router)
        .merge(open_router)
}
