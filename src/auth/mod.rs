//! Cookie-backed sessions on top of the identity provider.
//!
//! The provider issues an access token and a refresh token, stored in the
//! `sb-access-token` and `sb-refresh-token` cookies. Each request resolves
//! its session once; if the provider refreshed it along the way, the new
//! pair is written back to the client by `add_session_cookies`.

mod cookie;
mod errors;
mod extractors;
mod ip;
mod session;
mod state;
mod types;

pub use cookie::{
    ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, append_cleared_cookies, append_session_cookies,
    cookie_clear, get_cookie, session_cookies,
};
pub use errors::{ApiAuthError, LOGIN_PATH, PageAuthError};
pub use extractors::{
    ApiSession, MaybeSession, RequireSession, REFRESHED_SESSION, add_session_cookies, stash_refreshed,
};
pub use ip::{HasHeadersAndExtensions, extract_client_ip};
pub use session::{Resolution, resolve, sign_out};
pub use state::HasSessionBackend;
pub use types::{SessionState, SessionUser};
