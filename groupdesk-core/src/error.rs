//! Error types for GroupDesk core

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported cache record version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Unknown group role: {0}")]
    UnknownRole(String),

    #[error("Unknown report status: {0}")]
    UnknownReportStatus(String),
}
