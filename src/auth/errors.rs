//! Authentication error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::Serialize;

use super::cookie::append_cleared_cookies;

/// Where unauthenticated page requests are sent.
pub const LOGIN_PATH: &str = "/auth/login";

/// API authentication error.
///
/// `NotAuthenticated` is a JSON 401 that clears the session cookies.
/// `Unavailable` is a JSON 500 that leaves them alone, so the session
/// survives a provider outage.
#[derive(Debug)]
pub enum ApiAuthError {
    NotAuthenticated,
    Unavailable,
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
        }

        match self {
            Self::NotAuthenticated => {
                let mut response = (
                    StatusCode::UNAUTHORIZED,
                    Json(ErrorResponse {
                        error: "Not authenticated",
                    }),
                )
                    .into_response();
                append_cleared_cookies(response.headers_mut());
                response
            }
            Self::Unavailable => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Internal error",
                }),
            )
                .into_response(),
        }
    }
}

/// Page authentication error - redirects to login without clearing cookies,
/// so a still-valid refresh token can be used on the next request.
#[derive(Debug)]
pub struct PageAuthError;

impl IntoResponse for PageAuthError {
    fn into_response(self) -> Response {
        Redirect::temporary(LOGIN_PATH).into_response()
    }
}
