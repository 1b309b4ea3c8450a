//! strand-tools - The tool protocol.
//!
//! Defines the contract between the session loop and tool implementations:
//! a [`Tool`] exposes a stable name, a description, a typed argument schema,
//! and an async `execute`. The [`ToolContext`] carries the session id, the
//! call id, a cooperative cancellation signal, and a channel for in-flight
//! partial state.
//!
//! Tool *implementations* (file read/write, shell, glob) live outside the
//! engine core; this crate specifies only how they are discovered, invoked,
//! and how their results are serialized back.

pub mod context;
pub mod error;
pub mod registry;
pub mod tool;

pub use context::{PartialUpdate, ToolContext};
pub use error::ToolError;
pub use registry::ToolRegistry;
pub use tool::{Tool, ToolOutput};
