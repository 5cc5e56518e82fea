// ============================
// crates/backend-lib/src/error.rs
// ============================
//! Central error type.
//!
//! The taxonomy mirrors how failures surface to clients: `Validation`
//! makes a mutation a silent no-op, `Auth` and `NotFound` become explicit
//! failure events on the pairing paths, everything else aborts the
//! in-flight command and is only logged.
use thiserror::Error;

use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Human-readable reason suitable for a `login_failure` event.
    pub fn reason(&self) -> String {
        match self {
            AppError::Validation(e) => e.to_string(),
            AppError::Auth(msg) | AppError::Conflict(msg) | AppError::NotFound(msg) => msg.clone(),
            _ => "internal error".to_string(),
        }
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for AppError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        AppError::Internal("Failed to send message".to_string())
    }
}
