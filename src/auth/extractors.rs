//! Axum extractors for authentication.

use std::cell::RefCell;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};

use super::cookie::{append_session_cookies, sets_session_cookie};
use super::errors::{ApiAuthError, PageAuthError};
use super::session::{Resolution, resolve};
use super::state::HasSessionBackend;
use super::types::{SessionState, SessionUser};
use crate::provider::SessionTokens;

tokio::task_local! {
    /// Task-local storage for a token pair refreshed while resolving the session.
    /// Used to pass the tokens from the resolver to the response middleware.
    pub static REFRESHED_SESSION: RefCell<Option<SessionTokens>>;
}

/// Stash refreshed tokens for `add_session_cookies`. No-op outside its scope.
pub fn stash_refreshed(tokens: SessionTokens) {
    let _ = REFRESHED_SESSION.try_with(|cell| {
        cell.borrow_mut().replace(tokens);
    });
}

/// Session state for the request.
///
/// Reuses the state the route guard put into the request extensions; only
/// asks the provider when the request did not pass through the guard.
pub async fn session_state<S>(parts: &mut Parts, state: &S) -> SessionState
where
    S: HasSessionBackend + Send + Sync,
{
    if let Some(session) = parts.extensions.get::<SessionState>() {
        return session.clone();
    }

    let Resolution { state: session, refreshed } = resolve(state.provider(), &parts.headers).await;
    if let Some(tokens) = refreshed {
        stash_refreshed(tokens);
    }
    parts.extensions.insert(session.clone());
    session
}

// =============================================================================
// API Extractors
// =============================================================================

/// Extractor for API endpoints that require a session.
/// Returns JSON errors instead of redirects.
pub struct ApiSession(pub SessionUser);

impl<S> FromRequestParts<S> for ApiSession
where
    S: HasSessionBackend + Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match session_state(parts, state).await {
            SessionState::Authenticated(user) => Ok(ApiSession(user)),
            SessionState::Unauthenticated => Err(ApiAuthError::NotAuthenticated),
            SessionState::Unavailable => Err(ApiAuthError::Unavailable),
        }
    }
}

/// Optional session extractor - never fails.
pub struct MaybeSession(pub Option<SessionUser>);

impl<S> FromRequestParts<S> for MaybeSession
where
    S: HasSessionBackend + Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeSession(session_state(parts, state).await.into_user()))
    }
}

// =============================================================================
// Page Extractors
// =============================================================================

/// Extractor for pages that require a session.
/// On failure, redirects to login WITHOUT clearing cookies.
pub struct RequireSession(pub SessionUser);

impl<S> FromRequestParts<S> for RequireSession
where
    S: HasSessionBackend + Send + Sync,
{
    type Rejection = PageAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        session_state(parts, state)
            .await
            .into_user()
            .map(RequireSession)
            .ok_or(PageAuthError)
    }
}

// =============================================================================
// Response middleware
// =============================================================================

/// Write refreshed session tokens back to the client.
///
/// Runs the rest of the stack inside the `REFRESHED_SESSION` scope. Responses
/// that already set the access cookie (sign-in, sign-out) are left alone.
pub async fn add_session_cookies<S>(State(state): State<S>, request: Request, next: Next) -> Response
where
    S: HasSessionBackend + Clone + Send + Sync + 'static,
{
    REFRESHED_SESSION
        .scope(RefCell::new(None), async move {
            let mut response = next.run(request).await;
            let refreshed = REFRESHED_SESSION.with(|cell| cell.borrow_mut().take());
            if let Some(tokens) = refreshed {
                if !sets_session_cookie(response.headers()) {
                    append_session_cookies(
                        response.headers_mut(),
                        &tokens,
                        state.secure_cookies(),
                    );
                }
            }
            response
        })
        .await
}
