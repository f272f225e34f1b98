//! Session cookie parsing and formatting.

use axum::http::{HeaderMap, HeaderValue, header};

use crate::provider::{SessionCredentials, SessionTokens};

/// Cookie holding the provider access token.
pub const ACCESS_COOKIE_NAME: &str = "sb-access-token";

/// Cookie holding the provider refresh token.
pub const REFRESH_COOKIE_NAME: &str = "sb-refresh-token";

/// Refresh cookie lifetime: 2 weeks
pub const REFRESH_COOKIE_MAX_AGE_SECS: u64 = 14 * 24 * 60 * 60;

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                let value = value.trim();
                return (!value.is_empty()).then_some(value);
            }
        }
    }
    None
}

/// Session tokens carried by the request cookies.
pub fn session_credentials(headers: &HeaderMap) -> SessionCredentials {
    SessionCredentials {
        access_token: get_cookie(headers, ACCESS_COOKIE_NAME).map(str::to_string),
        refresh_token: get_cookie(headers, REFRESH_COOKIE_NAME).map(str::to_string),
    }
}

fn session_cookie(name: &str, value: &str, max_age: u64, secure: bool) -> String {
    let secure = if secure { "; Secure" } else { "" };
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}{}",
        name, value, max_age, secure
    )
}

/// `Set-Cookie` values storing a token pair.
pub fn session_cookies(tokens: &SessionTokens, secure: bool) -> [String; 2] {
    [
        session_cookie(
            ACCESS_COOKIE_NAME,
            &tokens.access_token,
            tokens.expires_in,
            secure,
        ),
        session_cookie(
            REFRESH_COOKIE_NAME,
            &tokens.refresh_token,
            REFRESH_COOKIE_MAX_AGE_SECS,
            secure,
        ),
    ]
}

/// `Set-Cookie` value expiring `name`.
pub fn cookie_clear(name: &str) -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Secure; Max-Age=0", name)
}

/// Append the token pair cookies to a response header map.
pub fn append_session_cookies(headers: &mut HeaderMap, tokens: &SessionTokens, secure: bool) {
    for cookie in session_cookies(tokens, secure) {
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            headers.append(header::SET_COOKIE, value);
        }
    }
}

/// Append cookies expiring both session cookies.
pub fn append_cleared_cookies(headers: &mut HeaderMap) {
    for name in [ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME] {
        if let Ok(value) = HeaderValue::from_str(&cookie_clear(name)) {
            headers.append(header::SET_COOKIE, value);
        }
    }
}

/// Whether a response already sets the access cookie.
pub fn sets_session_cookie(headers: &HeaderMap) -> bool {
    let prefix = format!("{}=", ACCESS_COOKIE_NAME);
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.starts_with(&prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_cookie_multiple() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("foo=bar; sb-access-token=abc123; sb-refresh-token=xyz789"),
        );

        assert_eq!(get_cookie(&headers, ACCESS_COOKIE_NAME), Some("abc123"));
        assert_eq!(get_cookie(&headers, REFRESH_COOKIE_NAME), Some("xyz789"));
        assert_eq!(get_cookie(&headers, "foo"), Some("bar"));
    }

    #[test]
    fn test_get_cookie_with_spaces() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("  sb-access-token = abc123  ; foo=bar"),
        );

        assert_eq!(get_cookie(&headers, ACCESS_COOKIE_NAME), Some("abc123"));
    }

    #[test]
    fn test_cleared_cookie_is_empty() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("sb-access-token="));

        assert_eq!(get_cookie(&headers, ACCESS_COOKIE_NAME), None);
        assert!(session_credentials(&headers).is_empty());
    }

    #[test]
    fn test_no_cookie_header() {
        assert!(session_credentials(&HeaderMap::new()).is_empty());
    }

    #[test]
    fn test_cookie_clear_format() {
        assert_eq!(
            cookie_clear(ACCESS_COOKIE_NAME),
            "sb-access-token=; Path=/; HttpOnly; SameSite=Lax; Secure; Max-Age=0"
        );
    }

    #[test]
    fn test_session_cookies_secure_flag() {
        let tokens = SessionTokens {
            access_token: "a".into(),
            refresh_token: "r".into(),
            expires_in: 3600,
        };

        let [access, refresh] = session_cookies(&tokens, false);
        assert_eq!(
            access,
            "sb-access-token=a; Path=/; HttpOnly; SameSite=Lax; Max-Age=3600"
        );
        assert!(refresh.starts_with("sb-refresh-token=r;"));
        assert!(!refresh.contains("Secure"));

        let [access, _] = session_cookies(&tokens, true);
        assert!(access.ends_with("; Secure"));
    }

    #[test]
    fn test_sets_session_cookie() {
        let mut headers = HeaderMap::new();
        assert!(!sets_session_cookie(&headers));
        append_cleared_cookies(&mut headers);
        assert!(sets_session_cookie(&headers));
    }
}
