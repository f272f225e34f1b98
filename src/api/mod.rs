mod auth;
mod error;
mod health;

use axum::Router;
use std::sync::Arc;
use url::Url;

use crate::provider::IdentityProvider;
use crate::rate_limit::RateLimitConfig;

pub use error::{ApiError, ResultExt};

/// Create the API router.
pub fn create_api_router(
    provider: Arc<dyn IdentityProvider>,
    secure_cookies: bool,
    site_url: Url,
    rate_limit_config: Arc<RateLimitConfig>,
) -> Router {
    let auth_state = auth::AuthState {
        provider: provider.clone(),
        secure_cookies,
        site_url,
        rate_limit_config,
    };

    let health_state = health::HealthState { provider };

    Router::new()
        .nest("/auth", auth::router(auth_state))
        .nest("/health", health::router(health_state))
}
