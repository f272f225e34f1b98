#![allow(dead_code)]

use axum::{Router, body::Body, http::Response};
use speakup::provider::{MemoryProvider, SessionTokens};
use speakup::{ServerConfig, create_app};
use std::sync::Arc;
use url::Url;

pub const USER_ID: &str = "uid123";
pub const USER_EMAIL: &str = "user@example.com";
pub const USER_PASSWORD: &str = "correct";
pub const EXISTING_EMAIL: &str = "exists@example.com";

pub struct TestApp {
    pub app: Router,
    pub provider: Arc<MemoryProvider>,
}

/// Server configuration backed by a memory provider with two accounts.
pub fn test_config() -> (ServerConfig, Arc<MemoryProvider>) {
    let provider = Arc::new(MemoryProvider::new(b"integration-test-secret"));
    provider.add_user(USER_ID, USER_EMAIL, USER_PASSWORD);
    provider.add_user("uid-exists", EXISTING_EMAIL, "whatever");

    let config = ServerConfig {
        provider: provider.clone(),
        site_url: Url::parse("http://localhost:3000").expect("Invalid URL"),
        secure_cookies: false,
        trust_forwarded_for: false,
    };
    (config, provider)
}

pub fn create_test_app() -> TestApp {
    let (config, provider) = test_config();
    TestApp {
        app: create_app(&config),
        provider,
    }
}

/// `Cookie` header value carrying a token pair.
pub fn session_cookie(tokens: &SessionTokens) -> String {
    format!(
        "sb-access-token={}; sb-refresh-token={}",
        tokens.access_token, tokens.refresh_token
    )
}

/// All `Set-Cookie` values of a response.
pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok().map(str::to_string))
        .collect()
}

pub fn location(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}
