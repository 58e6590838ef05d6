//! Client error types

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Backend returned {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Invalid backend response: {0}")]
    Decode(String),

    #[error("Session validation timed out after {0:?}")]
    Timeout(Duration),
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
