//! Matrix client errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MatrixError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Matrix API error: {status} {errcode} - {message}")]
    Api {
        status: u16,
        errcode: String,
        message: String,
    },
}

impl MatrixError {
    /// Whether the homeserver refused the credentials or token (401/403).
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, MatrixError::Api { status, .. } if *status == 401 || *status == 403)
    }

    /// Whether the access token is no longer known to the homeserver.
    pub fn is_unknown_token(&self) -> bool {
        matches!(self, MatrixError::Api { errcode, .. } if errcode == "M_UNKNOWN_TOKEN")
    }

    /// Whether the request ran into the client timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, MatrixError::Http(e) if e.is_timeout())
    }
}
