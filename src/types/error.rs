use anyhow::Error;
use thiserror::Error;

/// Exit code for a run that failed because of its configuration.
///
/// An external supervisor should not restart the process on this code: the
/// same configuration will fail again.
pub const EXIT_CODE_NO_RETRY: i32 = 3;

/// Exit code for any other fatal termination.
pub const EXIT_CODE_FATAL: i32 = 1;

/// Exit code for a run that only skipped objects, with `--warn-as-error`.
pub const EXIT_CODE_WARNING: i32 = 2;

/// Application-level error types for s3mv-rs.
///
/// ## Classes
///
/// - Configuration (`InvalidConfig`, `InvalidUri`, `UnsupportedMode`):
///   detected before the pipeline starts, never retried, exit code 3.
/// - `Processing`: a single object's content could not be read. Resumable.
/// - `Sink`: a write or delete failed for a specific object. Always fatal.
/// - `Storage` / `Pipeline`: unclassified collaborator or plumbing failures.
///   Always fatal.
/// - `Cancelled`: the run was stopped by its cancellation handle.
/// - `WarningsPromoted`: objects were skipped and warnings count as errors.
#[derive(Error, Debug, PartialEq)]
pub enum S3mvError {
    /// Configuration error (non-retryable).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Path with an unsupported or malformed addressing scheme.
    #[error("Invalid storage path: {0}")]
    InvalidUri(String),

    /// Execution mode this stream type does not support (e.g. backfill).
    #[error("Unsupported execution mode: {0}")]
    UnsupportedMode(String),

    /// The content of a single object could not be read.
    #[error("Failed to download {path}")]
    Processing { path: String, key: String },

    /// A write or delete failed for a specific object.
    #[error("Sink operation failed: {0}")]
    Sink(String),

    /// Storage backend failure that is not tied to a single object.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Operation cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// General pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// Objects were skipped during a run that treats warnings as errors.
    #[error("{0} object(s) skipped, warnings are treated as errors")]
    WarningsPromoted(u64),
}

impl S3mvError {
    /// Get the process exit code for this error.
    ///
    /// - 0: `Cancelled`
    /// - 3: configuration errors (do not retry)
    /// - 2: warnings promoted to errors
    /// - 1: everything else
    pub fn exit_code(&self) -> i32 {
        match self {
            S3mvError::Cancelled => 0,
            S3mvError::InvalidConfig(_)
            | S3mvError::InvalidUri(_)
            | S3mvError::UnsupportedMode(_) => EXIT_CODE_NO_RETRY,
            S3mvError::WarningsPromoted(_) => EXIT_CODE_WARNING,
            _ => EXIT_CODE_FATAL,
        }
    }

    pub fn is_configuration_error(&self) -> bool {
        self.exit_code() == EXIT_CODE_NO_RETRY
    }
}

/// Check if an anyhow::Error wraps a cancellation error.
pub fn is_cancelled_error(e: &Error) -> bool {
    if let Some(err) = e.downcast_ref::<S3mvError>() {
        return *err == S3mvError::Cancelled;
    }
    false
}

/// Check if an anyhow::Error wraps a configuration error.
pub fn is_configuration_error(e: &Error) -> bool {
    e.downcast_ref::<S3mvError>()
        .is_some_and(S3mvError::is_configuration_error)
}

/// Extract the exit code from an anyhow::Error, defaulting to 1.
pub fn exit_code_from_error(e: &Error) -> i32 {
    if let Some(err) = e.downcast_ref::<S3mvError>() {
        return err.exit_code();
    }
    EXIT_CODE_FATAL
}
