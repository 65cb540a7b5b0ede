//! Error taxonomy for the content exchange.
//!
//! Store and codec failures are mapped into [`ExchangeError`] at the protocol
//! boundary. Only the human-readable message of each variant ever reaches a
//! caller; internal details are logged server-side and replaced by a generic
//! message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message returned for absent and expired codes alike.
pub const NOT_FOUND_MESSAGE: &str = "Content not found or expired";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExchangeError {
    /// A required field is missing or malformed
    #[error("{0}")]
    Validation(String),

    /// The code has no live content (never existed, expired, or purged)
    #[error("Content not found or expired")]
    NotFoundOrExpired,

    /// Another live record already owns the code
    #[error("Access code is already in use")]
    DuplicateCode,

    /// Wrong code or corrupted ciphertext
    #[error("Content could not be decrypted, check your access code")]
    Decryption,

    /// Payload exceeds a configured ceiling
    #[error("{0}")]
    SizeLimitExceeded(String),

    /// Every allocation attempt collided with a live code
    #[error("No free access code available, try again later")]
    AllocationExhausted,

    /// Client could not reach the server or got an unreadable reply
    #[error("Server unreachable: {0}")]
    Transport(String),

    /// Storage or runtime failure; detail is for logs only
    #[error("Internal server error")]
    Internal(String),
}

/// JSON body for every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ExchangeError {
    pub fn status(&self) -> StatusCode {
        match self {
            ExchangeError::Validation(_) => StatusCode::BAD_REQUEST,
            ExchangeError::NotFoundOrExpired => StatusCode::NOT_FOUND,
            ExchangeError::DuplicateCode => StatusCode::CONFLICT,
            // Shares 400 with Validation, so from_response reads it back as
            // Validation; decryption is a client-side failure and never sent.
            ExchangeError::Decryption => StatusCode::BAD_REQUEST,
            ExchangeError::SizeLimitExceeded(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ExchangeError::AllocationExhausted => StatusCode::SERVICE_UNAVAILABLE,
            ExchangeError::Transport(_) => StatusCode::BAD_GATEWAY,
            ExchangeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Rebuild an error from a server response, the inverse of `into_response`.
    pub fn from_response(status: StatusCode, message: String) -> Self {
        match status {
            StatusCode::BAD_REQUEST => ExchangeError::Validation(message),
            StatusCode::NOT_FOUND => ExchangeError::NotFoundOrExpired,
            StatusCode::CONFLICT => ExchangeError::DuplicateCode,
            StatusCode::PAYLOAD_TOO_LARGE => ExchangeError::SizeLimitExceeded(message),
            StatusCode::SERVICE_UNAVAILABLE => ExchangeError::AllocationExhausted,
            _ => ExchangeError::Internal(format!("HTTP {}: {}", status, message)),
        }
    }
}

impl From<tokio::task::JoinError> for ExchangeError {
    fn from(err: tokio::task::JoinError) -> Self {
        ExchangeError::Internal(format!("Task join error: {}", err))
    }
}

impl From<rusqlite::Error> for ExchangeError {
    fn from(err: rusqlite::Error) -> Self {
        ExchangeError::Internal(format!("Database error: {}", err))
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        ExchangeError::Transport(err.to_string())
    }
}

impl IntoResponse for ExchangeError {
    fn into_response(self) -> Response {
        if let ExchangeError::Internal(detail) = &self {
            tracing::error!("Request failed: {}", detail);
        }
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
