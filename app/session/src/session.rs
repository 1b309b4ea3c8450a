//! Session metadata.

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use strand_protocol::ModelSpec;

/// Metadata for one conversation.
///
/// A session tracks identity, timestamps, lineage, and model selection, but
/// not the conversation history itself (see
/// [`MessageLedger`](crate::ledger::MessageLedger)).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier (UUID v4).
    pub id: String,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Last-updated timestamp.
    pub updated_at: DateTime<Utc>,

    /// The session this one was forked from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    /// Model selection.
    pub model: ModelSpec,

    /// System prompt configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Optional display title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Session {
    /// Create a new session for the given model.
    pub fn new(model: ModelSpec) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            parent_id: None,
            model,
            system_prompt: None,
            title: None,
        }
    }

    /// Set the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Update the last-updated timestamp to now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_has_no_parent() {
        let session = Session::new(ModelSpec::new("openai", "gpt-4o"));
        assert!(session.parent_id.is_none());
        assert_eq!(session.created_at, session.updated_at);
    }

    #[test]
    fn test_touch_advances_updated_at() {
        let mut session = Session::new(ModelSpec::new("openai", "gpt-4o"));
        let before = session.updated_at;
        std::thread::sleep(std::time::Duration::from_millis(2));
        session.touch();
        assert!(session.updated_at > before);
    }
}
