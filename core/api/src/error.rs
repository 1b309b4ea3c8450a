//! Error types for the retry transport.

use std::time::Duration;

use strand_sdk::SdkError;
use thiserror::Error;

/// Result type alias using ApiError.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors surfaced by the transport layer.
#[derive(Debug, Error)]
pub enum ApiError {
    /// An SDK-level failure (network, rate limit, provider, parse).
    #[error(transparent)]
    Sdk(#[from] SdkError),

    /// No stream progress within the per-chunk or per-step deadline.
    /// Terminal for the step.
    #[error("stream timeout after {0:?}")]
    StreamTimeout(Duration),

    /// The retry wall-clock budget elapsed. Fatal for the session.
    #[error("retry budget exhausted after {elapsed_ms}ms: {last_error}")]
    BudgetExhausted {
        /// Wall-clock time spent retrying, in milliseconds.
        elapsed_ms: i64,
        /// The last error that was being retried.
        last_error: String,
    },

    /// The user interrupted the operation.
    #[error("interrupted")]
    Interrupted,
}

impl ApiError {
    /// Check if the transport may retry after this error.
    ///
    /// Stream timeouts, budget exhaustion, and interrupts are never retried
    /// here; classification of SDK errors is delegated to
    /// [`SdkError::is_retryable`].
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Sdk(e) => e.is_retryable(),
            ApiError::StreamTimeout(_)
            | ApiError::BudgetExhausted { .. }
            | ApiError::Interrupted => false,
        }
    }

    /// The server-suggested retry delay, if any.
    pub fn retry_delay(&self) -> Option<Duration> {
        match self {
            ApiError::Sdk(e) => e.retry_delay(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sdk_retryability_passes_through() {
        let err = ApiError::Sdk(SdkError::NetworkError("reset".to_string()));
        assert!(err.is_retryable());

        let err = ApiError::Sdk(SdkError::AuthenticationFailed("nope".to_string()));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_transport_level_errors_not_retryable() {
        assert!(!ApiError::StreamTimeout(Duration::from_secs(120)).is_retryable());
        assert!(!ApiError::Interrupted.is_retryable());
        assert!(
            !ApiError::BudgetExhausted {
                elapsed_ms: 1,
                last_error: "x".to_string()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_retry_delay_passthrough() {
        let err = ApiError::Sdk(SdkError::RateLimitExceeded {
            message: "slow down".to_string(),
            retry_after: Some(Duration::from_secs(9)),
        });
        assert_eq!(err.retry_delay(), Some(Duration::from_secs(9)));
    }
}
