//! Typed errors for the engine library.
//!
//! The CLI layer uses `anyhow`; library modules return [`EngineError`] so
//! callers can branch on the failure class. Malformed generative replies are
//! deliberately absent from this taxonomy — they are recovered inside the
//! merge parser and never surface as errors.

use thiserror::Error;

/// All failure classes the engine reports to callers.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The requested document, subject, or version does not exist or is
    /// soft-deleted.
    #[error("not found: {0}")]
    NotFound(String),

    /// A required input was empty or otherwise unusable.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// An external backend (generative, speech-to-text, or remote storage)
    /// is unreachable, unconfigured, or timed out.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A storage operation failed in a way that is not a missing key.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
