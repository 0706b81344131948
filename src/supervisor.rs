use anyhow::Error;

use crate::types::error::S3mvError;

/// What the pipeline does after a stage reports a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Drop the failed object and keep going.
    Resume,
    /// Record the error as terminal and stop admitting new objects.
    Stop,
}

/// Decide whether a failure is tolerable.
///
/// Only a failure to read a single object's content is resumable. Sink
/// failures, configuration failures and anything the pipeline does not
/// recognise stop the run.
pub fn classify(e: &Error) -> Directive {
    match e.downcast_ref::<S3mvError>() {
        Some(S3mvError::Processing { .. }) => Directive::Resume,
        _ => Directive::Stop,
    }
}
