//! Error taxonomy shared by Quire components.

use thiserror::Error;

use crate::types::{FieldError, Purpose};

/// Errors surfaced to users of Quire
#[derive(Debug, Error)]
pub enum QuireError {
    /// Submitted CAPTCHA answer did not match (or no live challenge existed)
    #[error("CAPTCHA verification failed for {0}")]
    ChallengeMismatch(Purpose),

    /// Too few files for the requested action
    #[error("Insufficient input: {0}")]
    InsufficientInput(String),

    /// File extension outside the allow-list
    #[error("Invalid file type: {0}")]
    UnsupportedFileType(String),

    /// Request body above the configured limit
    #[error("Upload exceeds the {0} byte limit")]
    PayloadTooLarge(usize),

    /// Form fields missing or malformed
    #[error("Invalid form submission")]
    Validation(Vec<FieldError>),

    /// The PDF library rejected the operation
    #[error("Failed to {0} PDFs")]
    UpstreamOperationFailure(Purpose),

    /// One stale file could not be removed by the retention sweep
    #[error("Failed to remove {path}: {reason}")]
    SweepEntryFailure { path: String, reason: String },

    /// CAPTCHA image could not be produced
    #[error("CAPTCHA rendering failed: {0}")]
    Render(String),

    /// Session backend unavailable
    #[error("Session store error: {0}")]
    Session(String),

    /// Requested file does not exist
    #[error("File does not exist: {0}")]
    NotFound(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl QuireError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ChallengeMismatch(_) => 403,
            Self::InsufficientInput(_) => 400,
            Self::UnsupportedFileType(_) => 415,
            Self::PayloadTooLarge(_) => 413,
            Self::Validation(_) => 422,
            Self::UpstreamOperationFailure(_) => 500,
            Self::SweepEntryFailure { .. } => 500,
            Self::Render(_) => 500,
            Self::Session(_) => 503,
            Self::NotFound(_) => 404,
            Self::Config(_) => 500,
            Self::Internal(_) => 500,
        }
    }

    /// Returns true if the user can fix the request and try again
    pub fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ChallengeMismatch(_)
                | Self::InsufficientInput(_)
                | Self::UnsupportedFileType(_)
                | Self::PayloadTooLarge(_)
                | Self::Validation(_)
                | Self::NotFound(_)
        )
    }
}
