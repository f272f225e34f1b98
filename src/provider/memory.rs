//! In-process identity provider for local development and tests.
//!
//! Behaves like the hosted service from the gateway's point of view: it issues
//! HS256 access/refresh token pairs, rotates refresh tokens, answers row
//! queries from per-table row lists and reports failures through
//! [`ProviderError`]. Passwords are kept as given; this is not an account
//! store for production use.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    AuthSession, Claims, IdentityProvider, OtpType, ProviderError, ResolvedClaims, Row, RowQuery,
    SessionCredentials, SessionTokens, SignUpMetadata, User,
};

/// Access token duration: 1 hour
pub const ACCESS_TOKEN_DURATION_SECS: u64 = 60 * 60;

/// Refresh token duration: 2 weeks
pub const REFRESH_TOKEN_DURATION_SECS: u64 = 14 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenClaims {
    /// JWT ID, tracked for refresh tokens so they can be rotated and revoked
    jti: String,
    sub: String,
    email: Option<String>,
    #[serde(rename = "typ")]
    token_type: TokenType,
    iat: u64,
    exp: u64,
}

struct Account {
    user: User,
    password: String,
}

#[derive(Default)]
struct Store {
    /// Keyed by lowercased email
    accounts: HashMap<String, Account>,
    /// Live refresh token JTIs mapped to their owner's id
    refresh_tokens: HashMap<String, String>,
    /// Unused recovery token hashes mapped to their owner's id
    recovery_tokens: HashMap<String, String>,
    rows: HashMap<String, Vec<Row>>,
    reset_requests: Vec<(String, String)>,
}

impl Store {
    fn account_by_id(&self, id: &str) -> Option<&Account> {
        self.accounts.values().find(|a| a.user.id == id)
    }

    fn account_by_id_mut(&mut self, id: &str) -> Option<&mut Account> {
        self.accounts.values_mut().find(|a| a.user.id == id)
    }
}

#[derive(Default)]
struct Faults {
    unreachable: AtomicBool,
    fail_sign_out: AtomicBool,
    fail_queries: AtomicBool,
}

pub struct MemoryProvider {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    store: RwLock<Store>,
    faults: Faults,
    queries: AtomicUsize,
}

fn now_secs() -> Result<u64, ProviderError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| ProviderError::transport("system clock is before the Unix epoch"))
}

impl MemoryProvider {
    /// Create an empty provider signing tokens with `secret`.
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            store: RwLock::new(Store::default()),
            faults: Faults::default(),
            queries: AtomicUsize::new(0),
        }
    }

    /// Register an account with a fixed id.
    pub fn add_user(&self, id: &str, email: &str, password: &str) {
        let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
        store.accounts.insert(
            email.to_lowercase(),
            Account {
                user: User {
                    id: id.to_string(),
                    email: Some(email.to_string()),
                },
                password: password.to_string(),
            },
        );
    }

    /// Append a row to `table`. Non-object values are ignored.
    pub fn insert_row(&self, table: &str, row: Value) {
        if let Value::Object(row) = row {
            let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
            store.rows.entry(table.to_string()).or_default().push(row);
        }
    }

    /// Make every call fail as if the network were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.faults
            .unreachable
            .store(unreachable, AtomicOrdering::SeqCst);
    }

    pub fn set_fail_sign_out(&self, fail: bool) {
        self.faults.fail_sign_out.store(fail, AtomicOrdering::SeqCst);
    }

    pub fn set_fail_queries(&self, fail: bool) {
        self.faults.fail_queries.store(fail, AtomicOrdering::SeqCst);
    }

    /// Number of row queries answered or attempted so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(AtomicOrdering::SeqCst)
    }

    /// Password reset requests as `(email, redirect_to)` pairs.
    pub fn reset_requests(&self) -> Vec<(String, String)> {
        self.store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .reset_requests
            .clone()
    }

    /// Latest unused recovery token hash mailed to `email`.
    pub fn recovery_token(&self, email: &str) -> Option<String> {
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        let user_id = &store.accounts.get(&email.to_lowercase())?.user.id;
        store
            .recovery_tokens
            .iter()
            .find(|(_, owner)| *owner == user_id)
            .map(|(hash, _)| hash.clone())
    }

    /// Issue a fresh session for an existing user, bypassing the password.
    pub fn issue_session(&self, user_id: &str) -> Result<SessionTokens, ProviderError> {
        let user = self.user_by_id(user_id)?;
        self.issue_tokens(&user, 0)
    }

    /// Issue a session whose access token has already expired, so the next
    /// resolution has to go through the refresh token.
    pub fn issue_expired_session(&self, user_id: &str) -> Result<SessionTokens, ProviderError> {
        let user = self.user_by_id(user_id)?;
        self.issue_tokens(&user, ACCESS_TOKEN_DURATION_SECS + 60)
    }

    fn user_by_id(&self, user_id: &str) -> Result<User, ProviderError> {
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        store
            .account_by_id(user_id)
            .map(|a| a.user.clone())
            .ok_or_else(|| ProviderError::rejected("User not found"))
    }

    fn check_reachable(&self) -> Result<(), ProviderError> {
        if self.faults.unreachable.load(AtomicOrdering::SeqCst) {
            return Err(ProviderError::transport("connection refused"));
        }
        Ok(())
    }

    /// Sign a token pair. `backdate` shifts the access token into the past.
    fn issue_tokens(&self, user: &User, backdate: u64) -> Result<SessionTokens, ProviderError> {
        let now = now_secs()?;
        let issued = now.saturating_sub(backdate);

        let access = TokenClaims {
            jti: uuid::Uuid::new_v4().to_string(),
            sub: user.id.clone(),
            email: user.email.clone(),
            token_type: TokenType::Access,
            iat: issued,
            exp: issued + ACCESS_TOKEN_DURATION_SECS,
        };
        let refresh = TokenClaims {
            jti: uuid::Uuid::new_v4().to_string(),
            sub: user.id.clone(),
            email: user.email.clone(),
            token_type: TokenType::Refresh,
            iat: now,
            exp: now + REFRESH_TOKEN_DURATION_SECS,
        };

        let encode = |claims: &TokenClaims| {
            jsonwebtoken::encode(&Header::default(), claims, &self.encoding_key)
                .map_err(|e| ProviderError::transport(format!("failed to sign token: {}", e)))
        };
        let access_token = encode(&access)?;
        let refresh_token = encode(&refresh)?;

        self.store
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .refresh_tokens
            .insert(refresh.jti, user.id.clone());

        Ok(SessionTokens {
            access_token,
            refresh_token,
            expires_in: ACCESS_TOKEN_DURATION_SECS,
        })
    }

    fn decode(&self, token: &str, expected: TokenType) -> Option<TokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = jsonwebtoken::decode::<TokenClaims>(token, &self.decoding_key, &validation).ok()?;
        (data.claims.token_type == expected).then_some(data.claims)
    }

    /// User behind a valid access token, if its account still exists.
    fn user_for_access_token(&self, token: &str) -> Option<User> {
        let claims = self.decode(token, TokenType::Access)?;
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        store.account_by_id(&claims.sub).map(|a| a.user.clone())
    }

    /// Exchange a refresh token for a new pair, revoking the old one.
    fn rotate(&self, refresh_token: &str) -> Result<Option<(User, SessionTokens)>, ProviderError> {
        let Some(claims) = self.decode(refresh_token, TokenType::Refresh) else {
            return Ok(None);
        };

        let user = {
            let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
            if store.refresh_tokens.remove(&claims.jti).is_none() {
                return Ok(None);
            }
            match store.account_by_id(&claims.sub) {
                Some(account) => account.user.clone(),
                None => return Ok(None),
            }
        };

        let tokens = self.issue_tokens(&user, 0)?;
        Ok(Some((user, tokens)))
    }
}

#[async_trait]
impl IdentityProvider for MemoryProvider {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, ProviderError> {
        self.check_reachable()?;

        let user = {
            let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
            match store.accounts.get(&email.to_lowercase()) {
                Some(account) if account.password == password => account.user.clone(),
                _ => return Err(ProviderError::rejected("Invalid login credentials")),
            }
        };

        let session = self.issue_tokens(&user, 0)?;
        Ok(AuthSession {
            user,
            session: Some(session),
        })
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &SignUpMetadata,
    ) -> Result<AuthSession, ProviderError> {
        self.check_reachable()?;

        if email.is_empty() || password.is_empty() {
            return Err(ProviderError::rejected("Missing fields"));
        }

        let user = {
            let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
            let key = email.to_lowercase();
            if store.accounts.contains_key(&key) {
                return Err(ProviderError::rejected("User already registered"));
            }

            let user = User {
                id: uuid::Uuid::new_v4().to_string(),
                email: Some(email.to_string()),
            };
            store.accounts.insert(
                key,
                Account {
                    user: user.clone(),
                    password: password.to_string(),
                },
            );

            // Profile backfill, as a database trigger would do
            let mut profile = Row::new();
            profile.insert("id".into(), Value::String(user.id.clone()));
            profile.insert("first_name".into(), metadata.first_name.clone().into());
            profile.insert("last_name".into(), metadata.last_name.clone().into());
            store.rows.entry("users".into()).or_default().push(profile);

            user
        };

        let session = self.issue_tokens(&user, 0)?;
        Ok(AuthSession {
            user,
            session: Some(session),
        })
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), ProviderError> {
        self.check_reachable()?;

        if self.faults.fail_sign_out.load(AtomicOrdering::SeqCst) {
            return Err(ProviderError::transport("sign-out request failed"));
        }

        let claims = self
            .decode(access_token, TokenType::Access)
            .ok_or_else(|| ProviderError::rejected("Invalid session"))?;

        let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
        store.refresh_tokens.retain(|_, owner| *owner != claims.sub);
        Ok(())
    }

    async fn get_user(&self, access_token: &str) -> Result<Option<User>, ProviderError> {
        self.check_reachable()?;
        Ok(self.user_for_access_token(access_token))
    }

    async fn get_claims(
        &self,
        credentials: &SessionCredentials,
    ) -> Result<Option<ResolvedClaims>, ProviderError> {
        if credentials.is_empty() {
            return Ok(None);
        }
        self.check_reachable()?;

        if let Some(token) = credentials.access_token.as_deref() {
            if let Some(user) = self.user_for_access_token(token) {
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

        Ok(self.rotate(refresh_token)?.map(|(user, tokens)| ResolvedClaims {
            claims: Claims::from(&user),
            access_token: tokens.access_token.clone(),
            refreshed: Some(tokens),
        }))
    }

    async fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: &str,
    ) -> Result<(), ProviderError> {
        self.check_reachable()?;
        let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
        store
            .reset_requests
            .push((email.to_string(), redirect_to.to_string()));

        // Unknown addresses succeed too, without a token
        if let Some(user_id) = store
            .accounts
            .get(&email.to_lowercase())
            .map(|a| a.user.id.clone())
        {
            store.recovery_tokens.retain(|_, owner| *owner != user_id);
            store
                .recovery_tokens
                .insert(uuid::Uuid::new_v4().simple().to_string(), user_id);
        }
        Ok(())
    }

    async fn verify_otp(
        &self,
        token_hash: &str,
        kind: OtpType,
    ) -> Result<AuthSession, ProviderError> {
        self.check_reachable()?;

        let expired = || ProviderError::rejected("Email link is invalid or has expired");
        if kind != OtpType::Recovery {
            return Err(expired());
        }

        let user = {
            let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
            let user_id = store.recovery_tokens.remove(token_hash).ok_or_else(expired)?;
            store
                .account_by_id(&user_id)
                .map(|a| a.user.clone())
                .ok_or_else(expired)?
        };

        let tokens = self.issue_tokens(&user, 0)?;
        Ok(AuthSession {
            user,
            session: Some(tokens),
        })
    }

    async fn update_password(
        &self,
        access_token: &str,
        password: &str,
    ) -> Result<User, ProviderError> {
        self.check_reachable()?;

        let claims = self
            .decode(access_token, TokenType::Access)
            .ok_or_else(|| ProviderError::rejected("Auth session missing!"))?;

        let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
        let account = store
            .account_by_id_mut(&claims.sub)
            .ok_or_else(|| ProviderError::rejected("User not found"))?;
        account.password = password.to_string();
        Ok(account.user.clone())
    }

    async fn select(
        &self,
        _access_token: Option<&str>,
        query: &RowQuery,
    ) -> Result<Vec<Row>, ProviderError> {
        self.queries.fetch_add(1, AtomicOrdering::SeqCst);
        self.check_reachable()?;

        if self.faults.fail_queries.load(AtomicOrdering::SeqCst) {
            return Err(ProviderError::rejected(format!(
                "relation \"{}\" is unavailable",
                query.table
            )));
        }

        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        let mut rows: Vec<Row> = store
            .rows
            .get(&query.table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| matches_filters(row, &query.filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        drop(store);

        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let ord = compare_values(a.get(&order.column), b.get(&order.column));
                if order.ascending { ord } else { ord.reverse() }
            });
        }

        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }

        if let Some(columns) = query.column_names() {
            for row in &mut rows {
                row.retain(|key, _| columns.contains(&key.as_str()));
            }
        }

        Ok(rows)
    }

    async fn health(&self) -> Result<(), ProviderError> {
        self.check_reachable()
    }
}

fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn matches_filters(row: &Row, filters: &[(String, String)]) -> bool {
    filters.iter().all(|(column, expected)| {
        row.get(column)
            .is_some_and(|value| value_as_text(value) == *expected)
    })
}

/// Total order over JSON scalars for sorting. Missing and null sort first.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => value_as_text(x).cmp(&value_as_text(y)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider() -> MemoryProvider {
        let provider = MemoryProvider::new(b"memory-provider-test-secret");
        provider.add_user("uid123", "user@example.com", "correct");
        provider
    }

    #[tokio::test]
    async fn test_sign_in_and_resolve_claims() {
        let provider = provider();
        let session = provider
            .sign_in_with_password("user@example.com", "correct")
            .await
            .unwrap();
        assert_eq!(session.user.id, "uid123");

        let tokens = session.session.unwrap();
        let creds = SessionCredentials {
            access_token: Some(tokens.access_token.clone()),
            refresh_token: Some(tokens.refresh_token),
        };
        let resolved = provider.get_claims(&creds).await.unwrap().unwrap();
        assert_eq!(resolved.claims.sub, "uid123");
        assert_eq!(resolved.claims.email.as_deref(), Some("user@example.com"));
        assert!(resolved.refreshed.is_none());
    }

    #[tokio::test]
    async fn test_wrong_password_rejected() {
        let err = provider()
            .sign_in_with_password("user@example.com", "wrong")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Rejected(ref m) if m.contains("Invalid")));
    }

    #[tokio::test]
    async fn test_duplicate_sign_up_rejected() {
        let provider = provider();
        let err = provider
            .sign_up("USER@example.com", "secret", &SignUpMetadata::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "User already registered");
    }

    #[tokio::test]
    async fn test_sign_up_backfills_profile_row() {
        let provider = provider();
        let metadata = SignUpMetadata {
            first_name: Some("Ada".into()),
            last_name: None,
        };
        let session = provider
            .sign_up("ada@example.com", "secret", &metadata)
            .await
            .unwrap();

        let row = provider
            .maybe_single(None, &RowQuery::from("users").eq("id", &session.user.id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row["first_name"], "Ada");
        assert_eq!(row["last_name"], Value::Null);
    }

    #[tokio::test]
    async fn test_expired_access_token_is_refreshed_once() {
        let provider = provider();
        let tokens = provider.issue_expired_session("uid123").unwrap();
        let creds = SessionCredentials {
            access_token: Some(tokens.access_token),
            refresh_token: Some(tokens.refresh_token),
        };

        let resolved = provider.get_claims(&creds).await.unwrap().unwrap();
        let refreshed = resolved.refreshed.expect("should refresh");
        assert_eq!(resolved.access_token, refreshed.access_token);

        // The old refresh token was rotated out
        assert!(provider.get_claims(&creds).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sign_out_revokes_refresh_tokens() {
        let provider = provider();
        let tokens = provider.issue_session("uid123").unwrap();
        provider.sign_out(&tokens.access_token).await.unwrap();

        let creds = SessionCredentials {
            access_token: None,
            refresh_token: Some(tokens.refresh_token),
        };
        assert!(provider.get_claims(&creds).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recovery_token_is_single_use() {
        let provider = provider();
        provider
            .reset_password_for_email("User@Example.com", "http://localhost:3000/auth/confirm")
            .await
            .unwrap();
        let hash = provider.recovery_token("user@example.com").unwrap();

        let auth = provider.verify_otp(&hash, OtpType::Recovery).await.unwrap();
        assert_eq!(auth.user.id, "uid123");
        assert!(auth.session.is_some());

        let err = provider.verify_otp(&hash, OtpType::Recovery).await.unwrap_err();
        assert!(matches!(err, ProviderError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_reset_for_unknown_email_issues_no_token() {
        let provider = provider();
        provider
            .reset_password_for_email("nobody@example.com", "http://localhost:3000/auth/confirm")
            .await
            .unwrap();
        assert!(provider.recovery_token("nobody@example.com").is_none());
        assert_eq!(provider.reset_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_no_credentials_means_no_claims() {
        let provider = provider();
        provider.set_unreachable(true);
        let resolved = provider
            .get_claims(&SessionCredentials::default())
            .await
            .unwrap();
        assert!(resolved.is_none());
    }

    #[tokio::test]
    async fn test_select_orders_limits_and_projects() {
        let provider = provider();
        provider.insert_row("groups", json!({"id": "g1", "name": "One", "created_at": "2024-01-01T00:00:00Z"}));
        provider.insert_row("groups", json!({"id": "g2", "name": "Two", "created_at": "2024-03-01T00:00:00Z"}));
        provider.insert_row("groups", json!({"id": "g3", "name": "Three", "created_at": "2024-02-01T00:00:00Z"}));

        let rows = provider
            .select(
                None,
                &RowQuery::from("groups")
                    .select("id, name")
                    .order("created_at", false)
                    .limit(2),
            )
            .await
            .unwrap();

        let ids: Vec<_> = rows.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["g2", "g3"]);
        assert!(rows[0].get("created_at").is_none());
        assert_eq!(provider.query_count(), 1);
    }

    #[tokio::test]
    async fn test_maybe_single_rejects_multiple_rows() {
        let provider = provider();
        provider.insert_row("users", json!({"id": "dup"}));
        provider.insert_row("users", json!({"id": "dup"}));

        let result = provider
            .maybe_single(None, &RowQuery::from("users").eq("id", "dup"))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_transport_error() {
        let provider = provider();
        provider.set_unreachable(true);
        let err = provider.health().await.unwrap_err();
        assert!(matches!(err, ProviderError::Transport(_)));
    }
}
