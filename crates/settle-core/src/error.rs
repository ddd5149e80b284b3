//! Error types for settle-core.

use crate::resource::Shape;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by the core collaborators.
///
/// Both variants are programmer errors: they are reported synchronously,
/// before anything is attached to the resource.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// The value is not a stream, request or child process.
    #[error("expected a stream, request or child process resource, got shape {0:?}")]
    NotAResource(Shape),

    /// No tokio runtime is available to defer work onto.
    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),
}

impl CoreError {
    /// Creates a missing-runtime error.
    pub fn no_runtime(msg: impl Into<String>) -> Self {
        Self::NoRuntime(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_a_resource_display() {
        let err = CoreError::NotAResource(Shape::opaque());
        assert!(err.to_string().contains("expected a stream"));
    }

    #[test]
    fn test_no_runtime_display() {
        let err = CoreError::no_runtime("must be called from a runtime");
        assert_eq!(
            err.to_string(),
            "no tokio runtime available: must be called from a runtime"
        );
    }
}
