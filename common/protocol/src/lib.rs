//! strand-protocol - Shared types for the session engine.
//!
//! This crate defines the data model every other crate agrees on:
//!
//! - [`Message`] and its ordered [`Part`] sequence
//! - the tool-call state machine ([`ToolState`]), a single tagged union that
//!   is the authoritative set of legal status values
//! - [`TokenUsage`] and [`CostTotal`] with an explicit unknown marker so that
//!   missing provider data is never reported as zero
//! - [`EngineEvent`], the variants published on the event bus
//! - [`ModelSpec`] and the `provider/modelId` identifier grammar
//!
//! The types here are wire-visible: everything serializes with serde using
//! internally-tagged unions, and consumers match them exhaustively.

pub mod event;
pub mod message;
pub mod model;
pub mod part;
pub mod usage;

pub use event::{DiagnosticLevel, EngineError, EngineEvent, EventKind};
pub use message::{Message, Role, now_ms};
pub use model::{ModelCatalog, ModelCost, ModelInfo, ModelRef, ModelSpec, ModelSpecError};
pub use part::{
    FilePart, FinishReason, Part, PartKind, ReasoningPart, StepFinishPart, StepStartPart,
    TextPart, ToolPart, ToolState, ToolStatus, ToolTime,
};
pub use usage::{CostTotal, TokenCount, TokenUsage};
