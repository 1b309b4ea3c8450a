//! strand-loop - The session processor.
//!
//! Drives one turn of a conversation from prompt submission to
//! `session.idle`: builds requests from the ledger, consumes the provider
//! stream through the retry transport, dispatches tool calls, and decides
//! when the turn ends. All state flows through the
//! [`SessionStore`](strand_session::SessionStore); observers watch the bus.

pub mod driver;
pub mod result;

pub use driver::{ProcessorConfig, SessionProcessor, SessionProcessorBuilder};
pub use result::{StopReason, TurnResult};
