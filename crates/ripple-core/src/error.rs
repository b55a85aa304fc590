//! Error types for the ripple node

use thiserror::Error;

use crate::ErrorCode;

/// Core ripple errors
#[derive(Error, Debug)]
pub enum RippleError {
    // Request errors
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Node not initialized")]
    NotInitialized,

    // Transport errors
    #[error("Transport closed")]
    TransportClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    Config(String),

    // Internal errors
    #[error("Invariant violated: {0}")]
    Invariant(String),
}

impl RippleError {
    /// Protocol code used when this error is reported to a caller
    pub fn code(&self) -> ErrorCode {
        match self {
            RippleError::MalformedRequest(_) | RippleError::Json(_) => ErrorCode::MalformedRequest,
            RippleError::NotSupported(_) => ErrorCode::NotSupported,
            RippleError::NotInitialized | RippleError::TransportClosed => {
                ErrorCode::TemporarilyUnavailable
            }
            RippleError::Io(_) | RippleError::Config(_) | RippleError::Invariant(_) => {
                ErrorCode::Crash
            }
        }
    }

    /// Fatal errors stop the process; everything else is handled where detected
    pub fn is_fatal(&self) -> bool {
        matches!(self, RippleError::Invariant(_))
    }
}

/// Result type for ripple operations
pub type RippleResult<T> = Result<T, RippleError>;
