//! Error types for the bridge.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use matrix_client::MatrixError;
use serde::Serialize;
use thiserror::Error;

/// Bridge error types.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("username and password are required")]
    InvalidCredentials,

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Mapping not found: {0}")]
    MappingNotFound(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Upstream failure: {0}")]
    Upstream(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl BridgeError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            BridgeError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
            BridgeError::AuthenticationFailed(_) => {
                (StatusCode::UNAUTHORIZED, "AUTHENTICATION_FAILED")
            }
            BridgeError::InvalidRecipient(_) => (StatusCode::BAD_REQUEST, "INVALID_RECIPIENT"),
            BridgeError::MappingNotFound(_) => (StatusCode::NOT_FOUND, "MAPPING_NOT_FOUND"),
            BridgeError::ValidationFailed(_) => (StatusCode::BAD_REQUEST, "VALIDATION_FAILED"),
            BridgeError::Upstream(_) => (StatusCode::INTERNAL_SERVER_ERROR, "UPSTREAM_FAILURE"),
            BridgeError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            BridgeError::RateLimitExceeded => {
                (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMIT_EXCEEDED")
            }
            BridgeError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            BridgeError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            BridgeError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(e: std::io::Error) -> Self {
        BridgeError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::Storage(format!("JSON serialization error: {}", e))
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(e: reqwest::Error) -> Self {
        BridgeError::Upstream(e.to_string())
    }
}

impl From<MatrixError> for BridgeError {
    fn from(e: MatrixError) -> Self {
        BridgeError::Upstream(e.to_string())
    }
}
