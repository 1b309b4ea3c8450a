//! Rate limit extraction from HTTP response headers.
//!
//! Providers report rate-limit state in different header families. This
//! module normalizes them into one snapshot:
//!
//! - **OpenAI**: `x-ratelimit-remaining-requests`, `x-ratelimit-remaining-tokens`
//! - **Anthropic**: `anthropic-ratelimit-requests-remaining`, etc.
//! - **Generic**: `Retry-After` as delta-seconds or an HTTP-date

use std::time::Duration;

use http::HeaderMap;

/// Snapshot of rate-limit state from response headers.
#[derive(Debug, Clone, Default)]
pub struct RateLimitSnapshot {
    /// Remaining requests in the current window.
    pub remaining_requests: Option<i64>,
    /// Remaining tokens in the current window.
    pub remaining_tokens: Option<i64>,
    /// Time to wait before retrying, from `Retry-After`.
    pub retry_after: Option<Duration>,
}

impl RateLimitSnapshot {
    /// Parse rate-limit information from response headers.
    ///
    /// Returns `None` when no recognized header is present.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let remaining_requests = parse_i64_header(headers, "x-ratelimit-remaining-requests")
            .or_else(|| parse_i64_header(headers, "anthropic-ratelimit-requests-remaining"));

        let remaining_tokens = parse_i64_header(headers, "x-ratelimit-remaining-tokens")
            .or_else(|| parse_i64_header(headers, "anthropic-ratelimit-tokens-remaining"));

        let retry_after = parse_retry_after_header(headers);

        if remaining_requests.is_some() || remaining_tokens.is_some() || retry_after.is_some() {
            Some(Self {
                remaining_requests,
                remaining_tokens,
                retry_after,
            })
        } else {
            None
        }
    }

    /// Check if the window is exhausted.
    pub fn is_exhausted(&self) -> bool {
        self.remaining_requests == Some(0) || self.remaining_tokens == Some(0)
    }
}

fn parse_i64_header(headers: &HeaderMap, name: &str) -> Option<i64> {
    headers.get(name)?.to_str().ok()?.parse().ok()
}

/// Parse `Retry-After`: delta-seconds or an HTTP-date.
///
/// Unparseable values yield `None`; the caller falls back to its own backoff.
/// An HTTP-date in the past yields a zero wait rather than a negative one.
fn parse_retry_after_header(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get("retry-after")?.to_str().ok()?;
    parse_retry_after_value(value)
}

/// Parse a single `Retry-After` value.
pub fn parse_retry_after_value(value: &str) -> Option<Duration> {
    let value = value.trim();

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    // RFC 9110 allows an HTTP-date (RFC 2822 format on the wire).
    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value) {
        let wait = date.signed_duration_since(chrono::Utc::now());
        return Some(wait.to_std().unwrap_or(Duration::ZERO));
    }

    None
}

#[cfg(test)]
#[path = "rate_limits.test.rs"]
mod tests;
