//! Error taxonomy for the sidecar, with HTTP status mapping for the API layer

use hyper::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the compiler front-gate, deployment pipeline,
/// config store, and engine facade.
#[derive(Debug, Error)]
pub enum Error {
    /// Input failed schema validation, or a name was rejected as unsafe
    /// for use as a path segment.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The external validator ran and rejected the candidate config.
    /// Carries the validator's own diagnostic output, untouched.
    #[error("config rejected by validator: {diagnostic}")]
    ValidationRejected { diagnostic: String },

    /// No deployed config exists under this name.
    #[error("config not found: {0}")]
    NotFound(String),

    /// The candidate could not be written to the scratch area.
    /// Nothing was committed.
    #[error("failed to write scratch file {}: {source}", path.display())]
    ScratchWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Promotion into the live directory failed after validation passed.
    /// The live store is left as it was.
    #[error("failed to commit config to {}: {source}", path.display())]
    Commit {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The engine reported failure for a reload request.
    #[error("reload failed: {diagnostic}")]
    ReloadFailed { diagnostic: String },

    /// The validator or reload binary could not be launched at all,
    /// as opposed to running and rejecting.
    #[error("failed to launch {program}: {source}")]
    Process {
        program: String,
        source: std::io::Error,
    },

    /// Remaining filesystem failures from the store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// HTTP status the API layer reports for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::ValidationRejected { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::ScratchWrite { .. }
            | Error::Commit { .. }
            | Error::ReloadFailed { .. }
            | Error::Process { .. }
            | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
