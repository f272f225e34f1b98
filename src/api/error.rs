//! Shared error handling for API endpoints.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

use crate::provider::ProviderError;

/// Message for failures the client cannot act on.
pub const INTERNAL_ERROR: &str = "Internal error";

/// Extension trait for concise error mapping on provider Results.
pub trait ResultExt<T> {
    /// Provider refusals become 400 with the provider's message.
    fn or_bad_request(self, context: &str) -> Result<T, ApiError>;
    /// Provider refusals become 401 with the provider's message.
    fn or_unauthorized(self, context: &str) -> Result<T, ApiError>;
}

impl<T> ResultExt<T> for Result<T, ProviderError> {
    fn or_bad_request(self, context: &str) -> Result<T, ApiError> {
        self.map_err(|e| ApiError::from_provider(context, e, ApiError::BadRequest))
    }
    fn or_unauthorized(self, context: &str) -> Result<T, ApiError> {
        self.map_err(|e| ApiError::from_provider(context, e, ApiError::Unauthorized))
    }
}

/// API error type with automatic response conversion.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn internal(context: &str, e: impl std::fmt::Display) -> Self {
        error!("{}: {}", context, e);
        Self::Internal(INTERNAL_ERROR.into())
    }

    fn from_provider(context: &str, e: ProviderError, rejected: fn(String) -> Self) -> Self {
        match e {
            ProviderError::Rejected(msg) => rejected(msg),
            transport @ ProviderError::Transport(_) => Self::internal(context, transport),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

/// Reject missing or blank required fields. The value is returned as sent.
pub fn require<'a>(value: Option<&'a str>, message: &str) -> Result<&'a str, ApiError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ApiError::bad_request(message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_keeps_provider_message() {
        let result: Result<(), _> =
            Err(ProviderError::rejected("User already registered")).or_bad_request("Sign-up");
        assert!(matches!(result, Err(ApiError::BadRequest(ref m)) if m == "User already registered"));
    }

    #[test]
    fn test_transport_is_internal() {
        let result: Result<(), _> =
            Err(ProviderError::transport("connection refused")).or_unauthorized("Sign-in");
        assert!(matches!(result, Err(ApiError::Internal(ref m)) if m == INTERNAL_ERROR));
    }

    #[test]
    fn test_require() {
        assert_eq!(require(Some(" pw "), "x").unwrap(), " pw ");
        assert!(require(Some("   "), "x").is_err());
        assert!(require(None, "x").is_err());
    }
}
