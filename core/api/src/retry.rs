//! Retry context with a wall-clock budget.
//!
//! Recoverable failures are retried until a **budget** elapses, not until an
//! attempt counter runs out: a provider outage measured in hours should not
//! give up after three tries, and a `Retry-After` measured in minutes should
//! not be cut short.
//!
//! The delay law for one retry:
//!
//! ```text
//! backoff = min(max_delay, base * multiplier^attempt + jitter)
//! delay   = max(retry_after, backoff, min_interval)
//! ```
//!
//! Before sleeping, the context verifies `now + delay` still fits inside the
//! budget; when it does not, [`RetryDecision::BudgetExhausted`] is returned
//! and the caller surfaces the failure without sleeping.

use std::time::Duration;
use std::time::Instant;

use serde::Deserialize;
use serde::Serialize;

use crate::error::ApiError;

/// Configuration for retry behavior. All fields are in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Wall-clock retry budget. Default: 7 days.
    #[serde(default = "default_budget")]
    pub budget_ms: i64,
    /// Base delay for exponential backoff. Default: 1 s.
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: i64,
    /// Cap on a single delay. Default: 20 min.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: i64,
    /// Minimum interval between retries. Default: 30 s.
    #[serde(default = "default_min_interval")]
    pub min_interval_ms: i64,
    /// Backoff multiplier.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Jitter ratio (0.0-1.0) applied to the backoff component.
    #[serde(default = "default_jitter")]
    pub jitter_ratio: f64,
}

fn default_budget() -> i64 {
    604_800_000
}
fn default_base_delay() -> i64 {
    1_000
}
fn default_max_delay() -> i64 {
    1_200_000
}
fn default_min_interval() -> i64 {
    30_000
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_jitter() -> f64 {
    0.1
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            budget_ms: default_budget(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            min_interval_ms: default_min_interval(),
            multiplier: default_multiplier(),
            jitter_ratio: default_jitter(),
        }
    }
}

impl RetryConfig {
    /// Set the retry budget.
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget_ms = budget.as_millis() as i64;
        self
    }

    /// Set the base backoff delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay_ms = delay.as_millis() as i64;
        self
    }

    /// Set the single-delay cap.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = delay.as_millis() as i64;
        self
    }

    /// Set the minimum interval between retries.
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval_ms = interval.as_millis() as i64;
        self
    }

    /// Set the backoff multiplier.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set the jitter ratio (clamped to 0.0-1.0).
    pub fn with_jitter_ratio(mut self, ratio: f64) -> Self {
        self.jitter_ratio = ratio.clamp(0.0, 1.0);
        self
    }
}

/// Result of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the given delay.
    Retry {
        /// How long to wait before the next attempt.
        delay: Duration,
    },
    /// The error is not retryable.
    GiveUp,
    /// The delay would overrun the wall-clock budget.
    BudgetExhausted,
}

/// Retry state for one logical operation.
///
/// The budget clock starts when the context is created and spans every retry
/// of the operation.
#[derive(Debug, Clone)]
pub struct RetryContext {
    config: RetryConfig,
    started_at: Instant,
    attempt: i32,
}

impl RetryContext {
    /// Create a context; the budget clock starts now.
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            started_at: Instant::now(),
            attempt: 0,
        }
    }

    /// Create a context with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default())
    }

    /// Decide what to do about an error.
    pub fn decide(&mut self, error: &ApiError) -> RetryDecision {
        if !error.is_retryable() {
            return RetryDecision::GiveUp;
        }

        self.attempt += 1;
        let delay = self.calculate_delay(error);

        if !self.fits_budget(delay) {
            return RetryDecision::BudgetExhausted;
        }
        RetryDecision::Retry { delay }
    }

    /// The delay law: `max(retry_after, capped backoff, min_interval)`.
    fn calculate_delay(&self, error: &ApiError) -> Duration {
        let backoff_ms = {
            let raw = self.config.base_delay_ms as f64
                * self.config.multiplier.powi(self.attempt - 1);
            let jitter = raw * self.config.jitter_ratio * simple_random();
            ((raw + jitter) as i64).min(self.config.max_delay_ms)
        };

        let retry_after_ms = error
            .retry_delay()
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        let delay_ms = retry_after_ms
            .max(backoff_ms)
            .max(self.config.min_interval_ms)
            .max(0);
        Duration::from_millis(delay_ms as u64)
    }

    /// Whether sleeping `delay` keeps the operation inside the budget.
    fn fits_budget(&self, delay: Duration) -> bool {
        let elapsed = self.started_at.elapsed();
        let after_sleep = elapsed + delay;
        (after_sleep.as_millis() as i64) < self.config.budget_ms
    }

    /// Current attempt number.
    pub fn attempt(&self) -> i32 {
        self.attempt
    }

    /// Wall-clock time since the context was created, in milliseconds.
    pub fn elapsed_ms(&self) -> i64 {
        self.started_at.elapsed().as_millis() as i64
    }

    /// Budget remaining, in milliseconds (never negative).
    pub fn remaining_budget_ms(&self) -> i64 {
        (self.config.budget_ms - self.elapsed_ms()).max(0)
    }
}

/// Simple pseudo-random value in 0.0-1.0 for jitter.
fn simple_random() -> f64 {
    use std::sync::atomic::AtomicU64;
    use std::sync::atomic::Ordering;

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);

    let mixed = now.wrapping_mul(0x517cc1b727220a95).wrapping_add(count);
    let mixed = mixed ^ (mixed >> 33);
    let mixed = mixed.wrapping_mul(0xc4ceb9fe1a85ec53);
    let mixed = mixed ^ (mixed >> 33);

    (mixed as f64) / (u64::MAX as f64)
}

#[cfg(test)]
#[path = "retry.test.rs"]
mod tests;
