//! strand-sdk - Provider abstraction for the session engine.
//!
//! This crate owns everything between the engine's neutral model and a
//! provider's wire format:
//!
//! - [`Model`] / [`Provider`] traits and the static [`ProviderRegistry`]
//!   (providers are linked at build time and registered at program start)
//! - the neutral request/response model ([`GenerateRequest`], [`StreamEvent`])
//! - the SSE decoder ([`sse`]) with skip-and-continue corruption handling
//! - the [`CredentialResolver`] capability for per-request auth
//! - rate-limit header parsing ([`rate_limits`])
//! - the OpenAI-compatible chat-completions adapter
//!   ([`adapters::openai_compat`])
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      strand-sdk                            │
//! ├──────────────┬──────────────────┬──────────────────────────┤
//! │ Registry     │ Adapter          │ SSE Reader               │
//! │ - precedence │ - encode request │ - frame reassembly       │
//! │ - lookup     │ - decode chunks  │ - skip-and-continue      │
//! ├──────────────┴──────────────────┴──────────────────────────┤
//! │            reqwest / bytes / serde_json                    │
//! └────────────────────────────────────────────────────────────┘
//! ```

pub mod adapters;
pub mod credentials;
pub mod error;
pub mod messages;
pub mod provider;
pub mod rate_limits;
pub mod registry;
pub mod request;
pub mod response;
pub mod sse;

pub use credentials::{
    AnonymousResolver, CredentialResolver, IssuedToken, ProviderCredential, RefreshingResolver,
    StaticKeyResolver, TokenSource,
};
pub use error::{Result, SdkError};
pub use messages::{ContentBlock, Message, Role, ToolDefinition};
pub use provider::{EventStream, Model, Provider};
pub use rate_limits::RateLimitSnapshot;
pub use registry::ProviderRegistry;
pub use request::GenerateRequest;
pub use response::StreamEvent;
