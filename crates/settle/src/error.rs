//! Error types for starting a tracking operation
//!
//! These are programmer errors, returned synchronously before any observer is
//! attached. Failures of the tracked resource itself are never reported here;
//! they arrive through the completion callback as a
//! [`CompletionError`](crate::CompletionError).

use settle_core::{CoreError, Shape};
use thiserror::Error;

/// Result type alias for starting an operation.
pub type Result<T> = std::result::Result<T, TrackError>;

/// Reasons a tracking operation could not start.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackError {
    /// The value is not a stream, request or child process.
    #[error("settle: expected a stream, request or child process (shape: {0:?})")]
    NotAResource(Shape),

    /// The default scheduler needs a tokio runtime and none was running.
    #[error("settle: no tokio runtime to deliver the outcome on: {0}")]
    NoRuntime(String),
}

impl From<CoreError> for TrackError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotAResource(shape) => Self::NotAResource(shape),
            CoreError::NoRuntime(msg) => Self::NoRuntime(msg),
        }
    }
}
