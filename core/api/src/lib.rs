//! strand-api - Retry transport over the provider SDK.
//!
//! This crate wraps a [`Model`](strand_sdk::Model) with the recovery layer
//! the session loop relies on:
//!
//! - retry bounded by a wall-clock **budget**, not an attempt count
//! - rate-limit handling that honors server-supplied waits
//! - backoff sleeps isolated from request-level cancellation: a rate-limit
//!   wait is interrupted only by the user's interrupt signal (the budget
//!   bounds it by construction)
//! - per-chunk and per-step deadlines on the streaming response
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                    strand-api                         │
//! ├───────────────────┬───────────────────────────────────┤
//! │  ApiClient        │  UnifiedStream                    │
//! │  - retry loop     │  - chunk deadline (120 s)         │
//! │  - budget clock   │  - step deadline (600 s)          │
//! ├───────────────────┴───────────────────────────────────┤
//! │                    strand-sdk                         │
//! └───────────────────────────────────────────────────────┘
//! ```

pub mod client;
pub mod error;
pub mod retry;
pub mod unified_stream;

pub use client::{ApiClient, ApiClientConfig};
pub use error::{ApiError, Result};
pub use retry::{RetryConfig, RetryContext, RetryDecision};
pub use unified_stream::UnifiedStream;
