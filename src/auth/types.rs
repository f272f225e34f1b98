//! Authentication user types.

use crate::provider::Claims;

/// Signed-in user as seen by a handler.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub claims: Claims,
    /// Access token to act on the user's behalf (the refreshed one, if the
    /// session was refreshed while resolving)
    pub access_token: String,
}

impl SessionUser {
    pub fn user_id(&self) -> &str {
        &self.claims.sub
    }
}

/// Outcome of session resolution.
#[derive(Debug, Clone)]
pub enum SessionState {
    Authenticated(SessionUser),
    Unauthenticated,
    /// The provider could not be asked. Treated as signed out, but the
    /// cookies may still hold a good session.
    Unavailable,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    pub fn user(&self) -> Option<&SessionUser> {
        match self {
            Self::Authenticated(user) => Some(user),
            Self::Unauthenticated | Self::Unavailable => None,
        }
    }

    pub fn into_user(self) -> Option<SessionUser> {
        match self {
            Self::Authenticated(user) => Some(user),
            Self::Unauthenticated | Self::Unavailable => None,
        }
    }
}
