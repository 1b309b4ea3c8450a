//! Error types for strand-sdk.
//!
//! Provider-specific failures are converted into a unified [`SdkError`].
//! Network and parse variants store stringified messages rather than wrapping
//! source errors: each provider has different error types, and strings keep
//! handling uniform without leaking provider internals. The `From`
//! implementations preserve context by including the source error's Display
//! output.
//!
//! Classification follows behavior, not class name: [`SdkError::is_retryable`]
//! is the single place that decides what the retry transport may retry.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using SdkError.
pub type Result<T> = std::result::Result<T, SdkError>;

/// Errors that can occur when talking to a provider.
#[derive(Debug, Error)]
pub enum SdkError {
    /// Provider not found in the registry.
    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    /// Model not found or not supported by the provider.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// Authentication failed (invalid or missing credentials).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Credentials are valid but lack the required scope. Not retryable;
    /// the hint tells the user how to fix their grant.
    #[error("insufficient scope: {message} ({hint})")]
    PermissionDenied {
        /// What the provider said.
        message: String,
        /// Remediation hint surfaced to the user.
        hint: String,
    },

    /// Rate limit exceeded (HTTP 429 or a body-level rate_limit signal).
    #[error("rate limit exceeded: {message}")]
    RateLimitExceeded {
        /// What the provider said.
        message: String,
        /// Server-supplied wait, when present.
        retry_after: Option<Duration>,
    },

    /// Invalid request parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Network or HTTP transport error. Stringified; see module docs.
    #[error("network error: {0}")]
    NetworkError(String),

    /// Provider returned an error response.
    #[error("provider error: {code}: {message}")]
    ProviderError {
        /// Error code from the provider.
        code: String,
        /// Error message from the provider.
        message: String,
        /// HTTP status, when the error came from a response.
        status: Option<u16>,
    },

    /// Failed to parse a response payload. Stringified; see module docs.
    #[error("parse error: {0}")]
    ParseError(String),

    /// Streaming error mid-stream.
    #[error("stream error: {0}")]
    StreamError(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl SdkError {
    /// Check if this error is retryable.
    ///
    /// Transient failures that may succeed on retry:
    /// - rate limits (the server asked us to wait)
    /// - network faults (connection reset, DNS, timeouts)
    /// - provider 5xx responses
    pub fn is_retryable(&self) -> bool {
        match self {
            SdkError::RateLimitExceeded { .. } | SdkError::NetworkError(_) => true,
            SdkError::ProviderError { status, .. } => status.is_none_or(|s| s >= 500),
            _ => false,
        }
    }

    /// The server-suggested retry delay, if any.
    ///
    /// Prefers the structured `retry_after` from a 429; falls back to
    /// "try again in Xs" patterns embedded in the message body.
    pub fn retry_delay(&self) -> Option<Duration> {
        match self {
            SdkError::RateLimitExceeded {
                retry_after: Some(d),
                ..
            } => Some(*d),
            SdkError::RateLimitExceeded { message, .. } => parse_retry_after(message),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SdkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SdkError::NetworkError(format!("request timeout: {err}"))
        } else if err.is_connect() {
            SdkError::NetworkError(format!("connection failed: {err}"))
        } else {
            SdkError::NetworkError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SdkError {
    fn from(err: serde_json::Error) -> Self {
        SdkError::ParseError(err.to_string())
    }
}

/// Parse a retry-after delay from an error message.
///
/// Looks for patterns like "try again in 5s" or "try again in 500ms", which
/// rate-limited APIs embed in their error bodies.
pub fn parse_retry_after(message: &str) -> Option<Duration> {
    let re = retry_after_regex();
    let captures = re.captures(message)?;

    let value: f64 = captures.get(1)?.as_str().parse().ok()?;
    let unit = captures.get(2)?.as_str().to_ascii_lowercase();

    if unit == "s" || unit.starts_with("second") {
        Some(Duration::from_secs_f64(value))
    } else if unit == "ms" {
        Some(Duration::from_millis(value as u64))
    } else {
        None
    }
}

#[allow(clippy::expect_used)]
fn retry_after_regex() -> &'static regex_lite::Regex {
    static RE: std::sync::OnceLock<regex_lite::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| {
        regex_lite::Regex::new(r"(?i)try again in\s*(\d+(?:\.\d+)?)\s*(s|ms|seconds?)")
            .expect("invalid regex")
    })
}

#[cfg(test)]
#[path = "error.test.rs"]
mod tests;
