//! Tool error taxonomy.

use thiserror::Error;

/// Errors a tool execution can produce.
///
/// Abortion is distinct from failure: a cancelled tool ends in the `aborted`
/// terminal state, not `error`.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The arguments did not match the tool's schema.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The tool ran and failed.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// The tool observed its cancellation signal and stopped.
    #[error("aborted")]
    Aborted,

    /// An I/O error during execution.
    #[error("io error: {0}")]
    Io(String),
}

impl ToolError {
    /// Create an invalid-input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        ToolError::InvalidInput(message.into())
    }

    /// Create an execution-failed error.
    pub fn execution_failed(message: impl Into<String>) -> Self {
        ToolError::ExecutionFailed(message.into())
    }

    /// Whether this error is a cooperative abort.
    pub fn is_abort(&self) -> bool {
        matches!(self, ToolError::Aborted)
    }
}

impl From<std::io::Error> for ToolError {
    fn from(err: std::io::Error) -> Self {
        ToolError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_is_distinct_from_failure() {
        assert!(ToolError::Aborted.is_abort());
        assert!(!ToolError::execution_failed("boom").is_abort());
        assert!(!ToolError::invalid_input("bad").is_abort());
    }

    #[test]
    fn test_io_conversion() {
        let err: ToolError = std::io::Error::new(std::io::ErrorKind::NotFound, "missing").into();
        assert!(matches!(err, ToolError::Io(_)));
    }
}
