//! Event variants published on the engine bus.
//!
//! Consumers observe session progress through these events without coupling
//! to the engine internals. Payloads are immutable snapshots: a `Part` inside
//! an event never aliases the ledger's copy.

use serde::Deserialize;
use serde::Serialize;

use crate::message::Message;
use crate::part::Part;

/// Severity of a diagnostic event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticLevel {
    /// Informational.
    Info,
    /// Something was skipped or degraded but the stream continues.
    Warning,
}

/// An error surfaced on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineError {
    /// Machine-readable code.
    pub code: String,
    /// Human-readable description.
    pub message: String,
    /// Whether the session can continue after this error.
    #[serde(default)]
    pub recoverable: bool,
}

impl EngineError {
    /// Create an unrecoverable error.
    pub fn fatal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            recoverable: false,
        }
    }

    /// Create a recoverable error.
    pub fn recoverable(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            recoverable: true,
        }
    }
}

/// Events published by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    /// The session finished its turn and is waiting for input.
    #[serde(rename = "session.idle")]
    SessionIdle {
        /// Owning session.
        session_id: String,
    },
    /// The session hit an error.
    #[serde(rename = "session.error")]
    SessionError {
        /// Owning session.
        session_id: String,
        /// The error.
        error: EngineError,
    },
    /// A message was appended to a session.
    #[serde(rename = "message.created")]
    MessageCreated {
        /// Owning session.
        session_id: String,
        /// Snapshot of the new message.
        message: Message,
    },
    /// A part was appended or updated.
    #[serde(rename = "message.part.updated")]
    PartUpdated {
        /// Owning session.
        session_id: String,
        /// Owning message.
        message_id: String,
        /// Snapshot of the part after the update.
        part: Part,
    },
    /// A subscriber's queue overflowed and old events were dropped.
    #[serde(rename = "subscriber.overflow")]
    SubscriberOverflow {
        /// Subscriber whose queue overflowed.
        subscriber_id: u64,
        /// Total events dropped for this subscriber so far.
        dropped: i64,
    },
    /// Engine diagnostic (stream-parse skips, retry notices, fallbacks).
    #[serde(rename = "engine.diagnostic")]
    Diagnostic {
        /// Session the diagnostic belongs to, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        /// Severity.
        level: DiagnosticLevel,
        /// Description.
        message: String,
    },
}

/// Fieldless view of an event's kind, used by filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SessionIdle,
    SessionError,
    MessageCreated,
    PartUpdated,
    SubscriberOverflow,
    Diagnostic,
}

impl EngineEvent {
    /// The event kind.
    pub fn kind(&self) -> EventKind {
        match self {
            EngineEvent::SessionIdle { .. } => EventKind::SessionIdle,
            EngineEvent::SessionError { .. } => EventKind::SessionError,
            EngineEvent::MessageCreated { .. } => EventKind::MessageCreated,
            EngineEvent::PartUpdated { .. } => EventKind::PartUpdated,
            EngineEvent::SubscriberOverflow { .. } => EventKind::SubscriberOverflow,
            EngineEvent::Diagnostic { .. } => EventKind::Diagnostic,
        }
    }

    /// The owning session, when the event is session-scoped.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            EngineEvent::SessionIdle { session_id }
            | EngineEvent::SessionError { session_id, .. }
            | EngineEvent::MessageCreated { session_id, .. }
            | EngineEvent::PartUpdated { session_id, .. } => Some(session_id),
            EngineEvent::Diagnostic { session_id, .. } => session_id.as_deref(),
            EngineEvent::SubscriberOverflow { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tag_names() {
        let idle = EngineEvent::SessionIdle {
            session_id: "s1".to_string(),
        };
        let json = serde_json::to_value(&idle).unwrap();
        assert_eq!(json["type"], "session.idle");

        let overflow = EngineEvent::SubscriberOverflow {
            subscriber_id: 3,
            dropped: 12,
        };
        let json = serde_json::to_value(&overflow).unwrap();
        assert_eq!(json["type"], "subscriber.overflow");
    }

    #[test]
    fn test_session_id_accessor() {
        let event = EngineEvent::SessionError {
            session_id: "s9".to_string(),
            error: EngineError::fatal("budget_exhausted", "retry budget elapsed"),
        };
        assert_eq!(event.session_id(), Some("s9"));
        assert_eq!(event.kind(), EventKind::SessionError);

        let overflow = EngineEvent::SubscriberOverflow {
            subscriber_id: 0,
            dropped: 1,
        };
        assert_eq!(overflow.session_id(), None);
    }

    #[test]
    fn test_diagnostic_roundtrip() {
        let event = EngineEvent::Diagnostic {
            session_id: Some("s1".to_string()),
            level: DiagnosticLevel::Warning,
            message: "skipped malformed SSE frame".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: EngineEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
