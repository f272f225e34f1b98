//! Identity provider capability surface.
//!
//! Everything that touches accounts, sessions or stored rows goes through
//! [`IdentityProvider`]. The gateway never mints or verifies session tokens
//! itself; it hands the tokens it finds in cookies to the provider and acts on
//! the answer.

mod memory;
mod query;
mod supabase;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use memory::MemoryProvider;
pub use query::{Order, Row, RowQuery};
pub use supabase::SupabaseProvider;

/// Identity record owned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Decoded view of a valid session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl From<&User> for Claims {
    fn from(user: &User) -> Self {
        Self {
            sub: user.id.clone(),
            email: user.email.clone(),
        }
    }
}

/// Token pair issued by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
}

/// Tokens found on an incoming request. Either may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCredentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl SessionCredentials {
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

/// Result of a successful sign-in or sign-up.
///
/// `session` is `None` when the provider created the account but requires
/// email confirmation before issuing tokens.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user: User,
    pub session: Option<SessionTokens>,
}

/// Claims for a live session, plus the new token pair if the provider had to
/// refresh an expired access token to produce them.
#[derive(Debug, Clone)]
pub struct ResolvedClaims {
    pub claims: Claims,
    pub access_token: String,
    pub refreshed: Option<SessionTokens>,
}

/// Optional profile data attached at sign-up.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SignUpMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

/// Kind of one-time token carried by an email link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtpType {
    Signup,
    Invite,
    Magiclink,
    Recovery,
    #[serde(rename = "email_change")]
    EmailChange,
    Email,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The provider answered and refused the operation (bad credentials,
    /// duplicate account, expired session, ...). The message is user-facing.
    #[error("{0}")]
    Rejected(String),
    /// The provider could not be reached or answered with something unusable.
    #[error("provider transport error: {0}")]
    Transport(String),
}

impl ProviderError {
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}

/// Hosted identity and data service.
///
/// Implementations are shared across requests behind an `Arc`, so they must
/// not keep per-request state.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, ProviderError>;

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &SignUpMetadata,
    ) -> Result<AuthSession, ProviderError>;

    /// Invalidate the session behind `access_token`.
    async fn sign_out(&self, access_token: &str) -> Result<(), ProviderError>;

    /// Look up the user owning `access_token`. `Ok(None)` means the token is
    /// not (or no longer) valid.
    async fn get_user(&self, access_token: &str) -> Result<Option<User>, ProviderError>;

    /// Resolve request credentials to claims. `Ok(None)` means there is no
    /// valid session. May refresh an expired access token.
    async fn get_claims(
        &self,
        credentials: &SessionCredentials,
    ) -> Result<Option<ResolvedClaims>, ProviderError>;

    async fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: &str,
    ) -> Result<(), ProviderError>;

    /// Exchange the token hash of an email link for a session.
    async fn verify_otp(
        &self,
        token_hash: &str,
        kind: OtpType,
    ) -> Result<AuthSession, ProviderError>;

    async fn update_password(
        &self,
        access_token: &str,
        password: &str,
    ) -> Result<User, ProviderError>;

    /// Run a row query on behalf of `access_token` (or anonymously).
    async fn select(
        &self,
        access_token: Option<&str>,
        query: &RowQuery,
    ) -> Result<Vec<Row>, ProviderError>;

    async fn health(&self) -> Result<(), ProviderError>;

    /// Run a query expected to match at most one row.
    async fn maybe_single(
        &self,
        access_token: Option<&str>,
        query: &RowQuery,
    ) -> Result<Option<Row>, ProviderError> {
        let mut rows = self.select(access_token, &query.clone().limit(2)).await?;
        if rows.len() > 1 {
            return Err(ProviderError::rejected(
                "Query returned more than one row",
            ));
        }
        Ok(rows.pop())
    }
}
