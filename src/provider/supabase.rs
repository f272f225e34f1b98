//! HTTP client for a hosted Supabase project.
//!
//! Auth calls go to the GoTrue API under `/auth/v1`, row queries to PostgREST
//! under `/rest/v1`. Every request carries the project's anon key; calls made
//! on behalf of a user carry the user's access token as the bearer so the
//! project's row-level security applies.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use url::Url;

use super::{
    AuthSession, Claims, IdentityProvider, OtpType, ProviderError, ResolvedClaims, Row, RowQuery,
    SessionCredentials, SessionTokens, SignUpMetadata, User,
};

/// Token endpoint answer (`/token`, and `/signup` when auto-confirm is on).
#[derive(Deserialize)]
struct SessionResponse {
    access_token: String,
    refresh_token: String,
    expires_in: u64,
    user: User,
}

/// `/signup` answers with either a session or the bare user.
#[derive(Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(SessionResponse),
    User(User),
}

/// GoTrue and PostgREST use different error field names.
#[derive(Deserialize, Default)]
struct ErrorBody {
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

impl ErrorBody {
    fn into_message(self) -> Option<String> {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
    }
}

impl From<SessionResponse> for AuthSession {
    fn from(resp: SessionResponse) -> Self {
        AuthSession {
            user: resp.user,
            session: Some(SessionTokens {
                access_token: resp.access_token,
                refresh_token: resp.refresh_token,
                expires_in: resp.expires_in,
            }),
        }
    }
}

pub struct SupabaseProvider {
    client: Client,
    base_url: Url,
    anon_key: String,
}

impl SupabaseProvider {
    pub fn new(mut base_url: Url, anon_key: String) -> Self {
        // Url::join replaces the last segment unless the base ends with '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            client: Client::new(),
            base_url,
            anon_key,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        self.base_url
            .join(path)
            .map_err(|e| ProviderError::transport(format!("invalid endpoint {}: {}", path, e)))
    }

    /// Attach the anon key and a bearer (user token or the anon key itself).
    fn authorize(&self, builder: RequestBuilder, bearer: Option<&str>) -> RequestBuilder {
        builder
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer.unwrap_or(self.anon_key.as_str()))
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, ProviderError> {
        let response = builder
            .send()
            .await
            .map_err(|e| ProviderError::transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body: ErrorBody = response.json().await.unwrap_or_default();
        let message = body.into_message();
        debug!(status = %status, message = ?message, "Provider returned an error");

        if status.is_server_error() {
            return Err(ProviderError::transport(format!(
                "provider returned {}",
                status
            )));
        }
        Err(ProviderError::rejected(
            message.unwrap_or_else(|| format!("Request failed with status {}", status.as_u16())),
        ))
    }

    async fn parse<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T, ProviderError> {
        response
            .json()
            .await
            .map_err(|e| ProviderError::transport(format!("unreadable provider response: {}", e)))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Option<SessionResponse>, ProviderError> {
        let url = self.endpoint("auth/v1/token")?;
        let builder = self
            .authorize(self.client.post(url), None)
            .query(&[("grant_type", "refresh_token")])
            .json(&json!({ "refresh_token": refresh_token }));

        match self.send(builder).await {
            Ok(response) => Ok(Some(Self::parse(response).await?)),
            Err(ProviderError::Rejected(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl IdentityProvider for SupabaseProvider {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, ProviderError> {
        let url = self.endpoint("auth/v1/token")?;
        let builder = self
            .authorize(self.client.post(url), None)
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }));

        let session: SessionResponse = Self::parse(self.send(builder).await?).await?;
        Ok(session.into())
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &SignUpMetadata,
    ) -> Result<AuthSession, ProviderError> {
        let url = self.endpoint("auth/v1/signup")?;
        let builder = self.authorize(self.client.post(url), None).json(&json!({
            "email": email,
            "password": password,
            "data": metadata,
        }));

        match Self::parse(self.send(builder).await?).await? {
            SignUpResponse::Session(session) => Ok(session.into()),
            SignUpResponse::User(user) => Ok(AuthSession {
                user,
                session: None,
            }),
        }
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), ProviderError> {
        let url = self.endpoint("auth/v1/logout")?;
        let builder = self.authorize(self.client.post(url), Some(access_token));
        self.send(builder).await.map(|_| ())
    }

    async fn get_user(&self, access_token: &str) -> Result<Option<User>, ProviderError> {
        let url = self.endpoint("auth/v1/user")?;
        let builder = self.authorize(self.client.get(url), Some(access_token));

        let response = builder
            .send()
            .await
            .map_err(|e| ProviderError::transport(e.to_string()))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            status if status.is_success() => Ok(Some(Self::parse(response).await?)),
            status => Err(ProviderError::transport(format!(
                "user lookup returned {}",
                status
            ))),
        }
    }

    async fn get_claims(
        &self,
        credentials: &SessionCredentials,
    ) -> Result<Option<ResolvedClaims>, ProviderError> {
        if let Some(token) = credentials.access_token.as_deref() {
            if let Some(user) = self.get_user(token).await? {
                return Ok(Some(ResolvedClaims {
                    claims: Claims::from(&user),
                    access_token: token.to_string(),
                    refreshed: None,
                }));
            }
        }

        let Some(refresh_token) = credentials.refresh_token.as_deref() else {
            return Ok(None);
        };

        Ok(self
            .refresh(refresh_token)
            .await?
            .map(|session| ResolvedClaims {
                claims: Claims::from(&session.user),
                access_token: session.access_token.clone(),
                refreshed: Some(SessionTokens {
                    access_token: session.access_token,
                    refresh_token: session.refresh_token,
                    expires_in: session.expires_in,
                }),
            }))
    }

    async fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: &str,
    ) -> Result<(), ProviderError> {
        let url = self.endpoint("auth/v1/recover")?;
        let builder = self
            .authorize(self.client.post(url), None)
            .query(&[("redirect_to", redirect_to)])
            .json(&json!({ "email": email }));
        self.send(builder).await.map(|_| ())
    }

    async fn verify_otp(
        &self,
        token_hash: &str,
        kind: OtpType,
    ) -> Result<AuthSession, ProviderError> {
        let url = self.endpoint("auth/v1/verify")?;
        let builder = self
            .authorize(self.client.post(url), None)
            .json(&json!({ "type": kind, "token_hash": token_hash }));

        let session: SessionResponse = Self::parse(self.send(builder).await?).await?;
        Ok(session.into())
    }

    async fn update_password(
        &self,
        access_token: &str,
        password: &str,
    ) -> Result<User, ProviderError> {
        let url = self.endpoint("auth/v1/user")?;
        let builder = self
            .authorize(self.client.put(url), Some(access_token))
            .json(&json!({ "password": password }));
        Self::parse(self.send(builder).await?).await
    }

    async fn select(
        &self,
        access_token: Option<&str>,
        query: &RowQuery,
    ) -> Result<Vec<Row>, ProviderError> {
        let url = self.endpoint(&format!("rest/v1/{}", query.table))?;

        let mut params: Vec<(String, String)> =
            vec![("select".to_string(), query.columns.replace(' ', ""))];
        for (column, value) in &query.filters {
            params.push((column.clone(), format!("eq.{}", value)));
        }
        if let Some(order) = &query.order {
            let direction = if order.ascending { "asc" } else { "desc" };
            params.push(("order".to_string(), format!("{}.{}", order.column, direction)));
        }
        if let Some(limit) = query.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }

        let builder = self
            .authorize(self.client.get(url), access_token)
            .query(&params);
        Self::parse(self.send(builder).await?).await
    }

    async fn health(&self) -> Result<(), ProviderError> {
        let url = self.endpoint("auth/v1/health")?;
        let builder = self.authorize(self.client.get(url), None);
        self.send(builder).await.map(|_| ())
    }
}
