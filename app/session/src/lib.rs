//! strand-session - Authoritative in-memory state for active sessions.
//!
//! The [`SessionStore`] exclusively owns every session's message tree. The
//! session processor mutates it through a narrow interface (`append_part`,
//! `update_part` and friends); every accepted mutation is validated against
//! the part schema and published on the bus as an immutable snapshot. All
//! other components observe sessions only through those snapshots.
//!
//! Sessions live for the process lifetime; persistence is an optional
//! external sink subscribed to the bus, not a concern of this crate.

pub mod ledger;
pub mod session;
pub mod store;

pub use ledger::MessageLedger;
pub use session::Session;
pub use store::{SessionStore, StoreError};
