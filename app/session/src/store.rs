//! The session store.
//!
//! One store owns every active session. Cross-session operations (create,
//! get, fork, list) take a short registry lock; mutations inside a session
//! serialize on that session's own lock, so concurrent sessions never
//! contend on each other's ledgers.
//!
//! Every accepted mutation publishes a snapshot on the bus. Validation
//! happens here, at the edge of the state component: terminal parts are
//! immutable, tool status transitions must be legal, and tool call ids are
//! unique per session.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::RwLock;

use strand_bus::EventBus;
use strand_protocol::EngineEvent;
use strand_protocol::Message;
use strand_protocol::ModelSpec;
use strand_protocol::Part;
use strand_protocol::ToolState;
use strand_protocol::ToolStatus;
use thiserror::Error;
use tracing::debug;

use crate::ledger::MessageLedger;
use crate::session::Session;

/// Errors from session store operations.
#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    /// No such session.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// No such message in the session.
    #[error("message not found: {0}")]
    MessageNotFound(String),

    /// No such part in the session.
    #[error("part not found: {0}")]
    PartNotFound(String),

    /// The part is in a terminal state and may not change.
    #[error("part is frozen: {0}")]
    PartFrozen(String),

    /// The requested tool status transition is outside the state machine.
    #[error("illegal tool status transition: {from} -> {to}")]
    IllegalTransition {
        /// Status before the transition.
        from: ToolStatus,
        /// Requested status.
        to: ToolStatus,
    },

    /// The tool call id already exists in this session.
    #[error("duplicate tool call id: {0}")]
    DuplicateCallId(String),
}

struct SessionHandle {
    session: Session,
    ledger: MessageLedger,
}

/// Authoritative in-memory store for all active sessions.
pub struct SessionStore {
    bus: EventBus,
    sessions: RwLock<HashMap<String, Arc<Mutex<SessionHandle>>>>,
}

impl SessionStore {
    /// Create a store publishing on the given bus.
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// The bus this store publishes on.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Create a session and return its metadata snapshot.
    #[allow(clippy::expect_used)]
    pub fn create(&self, model: ModelSpec, system_prompt: Option<String>) -> Session {
        let mut session = Session::new(model);
        session.system_prompt = system_prompt;
        let snapshot = session.clone();
        debug!(session_id = %session.id, "Session created");

        self.sessions
            .write()
            .expect("session registry lock should not be poisoned")
            .insert(
                session.id.clone(),
                Arc::new(Mutex::new(SessionHandle {
                    session,
                    ledger: MessageLedger::new(),
                })),
            );
        snapshot
    }

    /// Get a session's metadata snapshot.
    pub fn get(&self, session_id: &str) -> Result<Session, StoreError> {
        self.with_handle(session_id, |handle| Ok(handle.session.clone()))
    }

    /// Fork a session: deep-copy its history into a new id with a parent
    /// link. The fork's ledger equals the source's at fork time.
    #[allow(clippy::expect_used)]
    pub fn fork(&self, session_id: &str) -> Result<Session, StoreError> {
        let (mut session, ledger) = self.with_handle(session_id, |handle| {
            Ok((handle.session.clone(), handle.ledger.clone()))
        })?;

        session.parent_id = Some(session.id.clone());
        session.id = uuid::Uuid::new_v4().to_string();
        session.touch();
        let snapshot = session.clone();
        debug!(
            session_id = %session.id,
            parent_id = %session_id,
            "Session forked"
        );

        self.sessions
            .write()
            .expect("session registry lock should not be poisoned")
            .insert(
                session.id.clone(),
                Arc::new(Mutex::new(SessionHandle { session, ledger })),
            );
        Ok(snapshot)
    }

    /// Sessions ordered by last-updated, newest first.
    #[allow(clippy::expect_used)]
    pub fn list_recent(&self) -> Vec<Session> {
        let handles: Vec<Arc<Mutex<SessionHandle>>> = {
            let registry = self
                .sessions
                .read()
                .expect("session registry lock should not be poisoned");
            registry.values().cloned().collect()
        };

        let mut sessions: Vec<Session> = handles
            .iter()
            .map(|h| {
                h.lock()
                    .expect("session lock should not be poisoned")
                    .session
                    .clone()
            })
            .collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sessions
    }

    /// Append a message; publishes `message.created`.
    pub fn append_message(&self, session_id: &str, message: Message) -> Result<(), StoreError> {
        let event = self.with_handle(session_id, |handle| {
            handle.ledger.push(message.clone());
            handle.session.touch();
            Ok(EngineEvent::MessageCreated {
                session_id: session_id.to_string(),
                message,
            })
        })?;
        self.bus.publish(event);
        Ok(())
    }

    /// Append a part to a message; publishes `message.part.updated`.
    ///
    /// Tool parts are checked for call-id uniqueness across the session.
    pub fn append_part(
        &self,
        session_id: &str,
        message_id: &str,
        part: Part,
    ) -> Result<(), StoreError> {
        let event = self.with_handle(session_id, |handle| {
            if let Part::Tool(tool) = &part {
                if handle.ledger.has_call_id(&tool.call_id) {
                    return Err(StoreError::DuplicateCallId(tool.call_id.clone()));
                }
            }
            let message = handle
                .ledger
                .message_mut(message_id)
                .ok_or_else(|| StoreError::MessageNotFound(message_id.to_string()))?;
            message.parts.push(part.clone());
            handle.session.touch();
            Ok(EngineEvent::PartUpdated {
                session_id: session_id.to_string(),
                message_id: message_id.to_string(),
                part,
            })
        })?;
        self.bus.publish(event);
        Ok(())
    }

    /// Mutate a non-terminal part in place; publishes the updated snapshot.
    ///
    /// The mutation is validated: frozen parts are rejected up front, and a
    /// tool part whose status changed must have made a legal transition
    /// (the mutation is rolled back otherwise).
    pub fn update_part(
        &self,
        session_id: &str,
        part_id: &str,
        mutate: impl FnOnce(&mut Part),
    ) -> Result<Part, StoreError> {
        let (event, snapshot) = self.with_handle(session_id, |handle| {
            let message_id = handle
                .ledger
                .find_part(part_id)
                .map(|(message_id, _)| message_id.to_string())
                .ok_or_else(|| StoreError::PartNotFound(part_id.to_string()))?;

            let message = handle
                .ledger
                .message_mut(&message_id)
                .ok_or_else(|| StoreError::MessageNotFound(message_id.clone()))?;
            let part = message
                .part_mut(part_id)
                .ok_or_else(|| StoreError::PartNotFound(part_id.to_string()))?;

            if part.is_frozen() {
                return Err(StoreError::PartFrozen(part_id.to_string()));
            }

            let before = part.clone();
            mutate(part);

            if let (Part::Tool(old), Part::Tool(new)) = (&before, &*part) {
                let from = old.state.status();
                let to = new.state.status();
                if from != to && !from.can_transition_to(to) {
                    *part = before;
                    return Err(StoreError::IllegalTransition { from, to });
                }
            }

            let snapshot = part.clone();
            handle.session.touch();
            Ok((
                EngineEvent::PartUpdated {
                    session_id: session_id.to_string(),
                    message_id,
                    part: snapshot.clone(),
                },
                snapshot,
            ))
        })?;
        self.bus.publish(event);
        Ok(snapshot)
    }

    /// Transition a tool part to a new state.
    ///
    /// Convenience wrapper over [`update_part`](Self::update_part) that
    /// swaps the whole [`ToolState`]; the same legality checks apply.
    pub fn transition_tool(
        &self,
        session_id: &str,
        part_id: &str,
        state: ToolState,
    ) -> Result<Part, StoreError> {
        self.update_part(session_id, part_id, |part| {
            if let Part::Tool(tool) = part {
                tool.state = state;
            }
        })
    }

    /// A deep snapshot of the session's ledger.
    pub fn ledger(&self, session_id: &str) -> Result<MessageLedger, StoreError> {
        self.with_handle(session_id, |handle| Ok(handle.ledger.clone()))
    }

    /// Ids of tool parts still in a non-terminal state, for cleanup.
    pub fn open_tool_parts(&self, session_id: &str) -> Result<Vec<String>, StoreError> {
        self.with_handle(session_id, |handle| Ok(handle.ledger.open_tool_part_ids()))
    }

    #[allow(clippy::expect_used)]
    fn with_handle<T>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut SessionHandle) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let handle = {
            let registry = self
                .sessions
                .read()
                .expect("session registry lock should not be poisoned");
            registry
                .get(session_id)
                .cloned()
                .ok_or_else(|| StoreError::SessionNotFound(session_id.to_string()))?
        };
        let mut guard = handle.lock().expect("session lock should not be poisoned");
        f(&mut guard)
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        #[allow(clippy::expect_used)]
        let count = self
            .sessions
            .read()
            .expect("session registry lock should not be poisoned")
            .len();
        f.debug_struct("SessionStore").field("sessions", &count).finish()
    }
}

#[cfg(test)]
#[path = "store.test.rs"]
mod tests;
