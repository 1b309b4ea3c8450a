//! High-level API client: the retry transport.
//!
//! [`ApiClient::stream_request`] drives one logical streaming request to
//! completion. Recoverable failures (rate limits, network faults, provider
//! 5xx) are retried under a wall-clock budget; everything else returns
//! immediately.
//!
//! # Sleep isolation
//!
//! The backoff sleep lives in this loop, outside any request-scoped timeout:
//! a per-request deadline can never abort a rate-limit wait. The sleep races
//! exactly two signals - the user's interrupt token and the retry budget
//! (enforced before the sleep starts by [`RetryContext::decide`]).

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use strand_sdk::GenerateRequest;
use strand_sdk::Model;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::error::ApiError;
use crate::error::Result;
use crate::retry::RetryConfig;
use crate::retry::RetryContext;
use crate::retry::RetryDecision;
use crate::unified_stream::UnifiedStream;

/// Configuration for the API client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiClientConfig {
    /// Retry configuration.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Per-chunk read timeout. Default: 2 min.
    #[serde(default = "default_chunk_timeout", with = "humantime_serde")]
    pub chunk_timeout: Duration,
    /// Per-step total timeout. Default: 10 min.
    #[serde(default = "default_step_timeout", with = "humantime_serde")]
    pub step_timeout: Duration,
}

fn default_chunk_timeout() -> Duration {
    Duration::from_millis(120_000)
}
fn default_step_timeout() -> Duration {
    Duration::from_millis(600_000)
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            chunk_timeout: default_chunk_timeout(),
            step_timeout: default_step_timeout(),
        }
    }
}

impl ApiClientConfig {
    /// Set the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the per-chunk timeout.
    pub fn with_chunk_timeout(mut self, timeout: Duration) -> Self {
        self.chunk_timeout = timeout;
        self
    }

    /// Set the per-step timeout.
    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }
}

/// The retry transport over a [`Model`].
#[derive(Debug, Clone, Default)]
pub struct ApiClient {
    config: ApiClientConfig,
}

impl ApiClient {
    /// Create a client with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a client with custom configuration.
    pub fn with_config(config: ApiClientConfig) -> Self {
        Self { config }
    }

    /// The current configuration.
    pub fn config(&self) -> &ApiClientConfig {
        &self.config
    }

    /// Make a streaming request, retrying recoverable failures within the
    /// wall-clock budget.
    ///
    /// `interrupt` is the user's interrupt signal (SIGINT). It is the only
    /// cancellation that can cut a backoff sleep short; request-level
    /// deadlines do not reach this loop.
    pub async fn stream_request(
        &self,
        model: &dyn Model,
        request: GenerateRequest,
        interrupt: &CancellationToken,
    ) -> Result<UnifiedStream> {
        let mut retry_ctx = RetryContext::new(self.config.retry.clone());

        loop {
            if interrupt.is_cancelled() {
                return Err(ApiError::Interrupted);
            }

            debug!(
                provider = %model.provider_id(),
                model = %model.model_id(),
                attempt = retry_ctx.attempt(),
                "Making API request"
            );

            match model.stream(request.clone()).await {
                Ok(stream) => {
                    return Ok(UnifiedStream::new(
                        stream,
                        self.config.chunk_timeout,
                        self.config.step_timeout,
                    ));
                }
                Err(sdk_error) => {
                    let error = ApiError::from(sdk_error);
                    match retry_ctx.decide(&error) {
                        RetryDecision::Retry { delay } => {
                            warn!(
                                attempt = retry_ctx.attempt(),
                                delay_ms = delay.as_millis() as i64,
                                elapsed_ms = retry_ctx.elapsed_ms(),
                                remaining_budget_ms = retry_ctx.remaining_budget_ms(),
                                error = %error,
                                "Retrying after recoverable failure"
                            );
                            tokio::select! {
                                biased;
                                _ = interrupt.cancelled() => return Err(ApiError::Interrupted),
                                _ = tokio::time::sleep(delay) => {}
                            }
                        }
                        RetryDecision::GiveUp => return Err(error),
                        RetryDecision::BudgetExhausted => {
                            return Err(ApiError::BudgetExhausted {
                                elapsed_ms: retry_ctx.elapsed_ms(),
                                last_error: error.to_string(),
                            });
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "client.test.rs"]
mod tests;
