//! Rate limiting for authentication endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking to slow down credential
//! stuffing, sign-up spam and reset-email floods.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc};
use tracing::warn;

use crate::auth::extract_client_ip;

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

const LOGIN_PER_SEC: NonZeroU32 = NonZeroU32::new(1).unwrap();
const LOGIN_BURST: NonZeroU32 = NonZeroU32::new(10).unwrap();
const SIGNUP_PER_MIN: NonZeroU32 = NonZeroU32::new(5).unwrap();
const RESET_PER_MIN: NonZeroU32 = NonZeroU32::new(3).unwrap();

/// Rate limiting configuration for authentication endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Password sign-in: bursts of 10, refilled at 1 per second
    pub login: Arc<IpLimiter>,
    /// Account creation: 5 per minute
    pub signup: Arc<IpLimiter>,
    /// Reset emails and password changes: 3 per minute
    pub password_reset: Arc<IpLimiter>,
    /// Key on the right-most `X-Forwarded-For` entry instead of the peer address
    pub trust_forwarded_for: bool,
}

impl RateLimitConfig {
    /// Create rate limiters with the default quotas.
    pub fn new(trust_forwarded_for: bool) -> Self {
        Self {
            login: Arc::new(RateLimiter::keyed(
                Quota::per_second(LOGIN_PER_SEC).allow_burst(LOGIN_BURST),
            )),
            signup: Arc::new(RateLimiter::keyed(Quota::per_minute(SIGNUP_PER_MIN))),
            password_reset: Arc::new(RateLimiter::keyed(Quota::per_minute(RESET_PER_MIN))),
            trust_forwarded_for,
        }
    }
}

async fn check(
    limiter: &IpLimiter,
    trust_forwarded_for: bool,
    message: &'static str,
    request: Request,
    next: Next,
) -> Response {
    let ip = extract_client_ip(&request, trust_forwarded_for);

    match limiter.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            warn!(ip = %ip, path = %request.uri().path(), "Rate limit exceeded");
            (StatusCode::TOO_MANY_REQUESTS, message).into_response()
        }
    }
}

/// Middleware for rate limiting sign-in endpoints.
pub async fn rate_limit_login(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    check(
        &config.login,
        config.trust_forwarded_for,
        "Too many sign-in attempts. Please wait before trying again.",
        request,
        next,
    )
    .await
}

/// Middleware for rate limiting account creation.
pub async fn rate_limit_signup(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    check(
        &config.signup,
        config.trust_forwarded_for,
        "Too many signup attempts. Please wait before trying again.",
        request,
        next,
    )
    .await
}

/// Middleware for rate limiting password reset and update.
pub async fn rate_limit_password_reset(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    check(
        &config.password_reset,
        config.trust_forwarded_for,
        "Too many password reset requests. Please try again later.",
        request,
        next,
    )
    .await
}
