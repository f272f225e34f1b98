//! Session resolution and sign-out.

use axum::http::HeaderMap;
use tracing::{debug, warn};

use super::cookie::{ACCESS_COOKIE_NAME, get_cookie, session_credentials};
use super::types::{SessionState, SessionUser};
use crate::provider::{IdentityProvider, ProviderError, SessionTokens};

/// Session state for one request, plus the token pair to hand back to the
/// client if the provider refreshed the session.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub state: SessionState,
    pub refreshed: Option<SessionTokens>,
}

impl Resolution {
    fn without_session(state: SessionState) -> Self {
        Self {
            state,
            refreshed: None,
        }
    }
}

/// Resolve the session carried by the request cookies.
///
/// Asks the provider exactly once. Provider errors never authenticate: a
/// refusal is `Unauthenticated`, an unreachable provider is `Unavailable`.
pub async fn resolve(provider: &dyn IdentityProvider, headers: &HeaderMap) -> Resolution {
    let credentials = session_credentials(headers);

    match provider.get_claims(&credentials).await {
        Ok(Some(resolved)) => {
            if resolved.refreshed.is_some() {
                debug!(user = %resolved.claims.sub, "Session refreshed during resolution");
            }
            Resolution {
                state: SessionState::Authenticated(SessionUser {
                    claims: resolved.claims,
                    access_token: resolved.access_token,
                }),
                refreshed: resolved.refreshed,
            }
        }
        Ok(None) => Resolution::without_session(SessionState::Unauthenticated),
        Err(e @ ProviderError::Rejected(_)) => {
            debug!(error = %e, "Session rejected by provider");
            Resolution::without_session(SessionState::Unauthenticated)
        }
        Err(e @ ProviderError::Transport(_)) => {
            warn!(error = %e, "Session lookup failed, treating request as unauthenticated");
            Resolution::without_session(SessionState::Unavailable)
        }
    }
}

/// Ask the provider to end the session, if there is one.
///
/// Never fails: callers clear the cookies and move on whatever the provider
/// says.
pub async fn sign_out(provider: &dyn IdentityProvider, headers: &HeaderMap) {
    let Some(access_token) = get_cookie(headers, ACCESS_COOKIE_NAME) else {
        debug!("Sign-out without an access token");
        return;
    };

    if let Err(e) = provider.sign_out(access_token).await {
        warn!(error = %e, "Provider sign-out failed, clearing local session anyway");
    }
}
