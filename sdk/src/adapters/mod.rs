//! Provider adapters.
//!
//! Each adapter translates between the neutral request/event model and one
//! provider wire format. Adapters are linked at build time and registered in
//! the [`ProviderRegistry`](crate::registry::ProviderRegistry) at startup.

pub mod openai_compat;

pub use openai_compat::{OpenAiCompatConfig, OpenAiCompatProvider};
