//! # Error Handling
//!
//! Two families of errors live here:
//!
//! - [`CaptureError`]: per-message failures of the capture protocol. They are
//!   always recoverable: the connection stays open, the client gets an
//!   `error` reply and the session state machine moves on.
//! - [`AppError`]: failures of the HTTP surface, converted to JSON responses.
//!
//! Anything that should stop the process (bad configuration, storage reset
//! failing, bind failing) is an `anyhow::Error` returned from `main`.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;
use std::path::PathBuf;

/// Failures of a single capture session.
///
/// ## Variants:
/// - **InvalidPayload**: audio bytes that are not whole `f32` samples
/// - **UnexpectedMessage**: a message whose kind does not fit the session state
/// - **StorageFailure**: the scratch artifact could not be written
/// - **CommitFailure**: the capture could not be moved to its final name
#[derive(Debug)]
pub enum CaptureError {
    InvalidPayload(String),
    UnexpectedMessage(String),
    StorageFailure {
        path: PathBuf,
        source: std::io::Error,
    },
    CommitFailure(String),
}

impl CaptureError {
    /// Stable code sent to clients in `error` replies.
    pub fn code(&self) -> &'static str {
        match self {
            CaptureError::InvalidPayload(_) => "invalid_payload",
            CaptureError::UnexpectedMessage(_) => "unexpected_message",
            CaptureError::StorageFailure { .. } => "storage_failure",
            CaptureError::CommitFailure(_) => "commit_failure",
        }
    }

    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CaptureError::StorageFailure {
            path: path.into(),
            source,
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::InvalidPayload(msg) => write!(f, "Invalid audio payload: {}", msg),
            CaptureError::UnexpectedMessage(msg) => write!(f, "Unexpected message: {}", msg),
            CaptureError::StorageFailure { path, source } => {
                write!(f, "Storage failure on {}: {}", path.display(), source)
            }
            CaptureError::CommitFailure(msg) => write!(f, "Commit failed: {}", msg),
        }
    }
}

impl std::error::Error for CaptureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CaptureError::StorageFailure { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Errors returned by HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// Server-side problems (500)
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

/// JSON body for every error response:
/// ```json
/// { "error": { "type": "internal_error", "message": "...", "timestamp": "..." } }
/// ```
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (error_type, message) = match self {
            AppError::Internal(msg) => ("internal_error", msg.clone()),
        };

        HttpResponse::InternalServerError().json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(format!("I/O error: {}", err))
    }
}

pub type AppResult<T> = Result<T, AppError>;
