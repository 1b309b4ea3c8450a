//! Messages: ordered part sequences owned by a session.

use serde::Deserialize;
use serde::Serialize;

use crate::part::Part;

/// Current time in Unix milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The human (or upstream caller).
    User,
    /// The model.
    Assistant,
}

impl Role {
    /// Get the role as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A message in a session: a role plus an append-only, ordered part sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message identifier (UUID v4).
    pub id: String,
    /// Author.
    pub role: Role,
    /// Ordered parts; ordering is stable and monotonic.
    pub parts: Vec<Part>,
    /// Creation time, Unix milliseconds.
    pub created_at: i64,
}

impl Message {
    /// Create a message with the given role and parts.
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            parts,
            created_at: now_ms(),
        }
    }

    /// Create a user message.
    pub fn user(parts: Vec<Part>) -> Self {
        Self::new(Role::User, parts)
    }

    /// Create an empty assistant message.
    pub fn assistant() -> Self {
        Self::new(Role::Assistant, Vec::new())
    }

    /// Find a part by id.
    pub fn part(&self, part_id: &str) -> Option<&Part> {
        self.parts.iter().find(|p| p.id() == part_id)
    }

    /// Find a part by id, mutably.
    pub fn part_mut(&mut self, part_id: &str) -> Option<&mut Part> {
        self.parts.iter_mut().find(|p| p.id() == part_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::part::TextPart;

    #[test]
    fn test_role_as_str() {
        assert_eq!(Role::User.as_str(), "user");
        assert_eq!(Role::Assistant.as_str(), "assistant");
    }

    #[test]
    fn test_message_part_lookup() {
        let mut msg = Message::user(vec![Part::Text(TextPart {
            id: "p1".to_string(),
            text: "hi".to_string(),
            completed: true,
        })]);
        assert!(msg.part("p1").is_some());
        assert!(msg.part("p2").is_none());
        assert!(msg.part_mut("p1").is_some());
    }

    #[test]
    fn test_message_ids_unique() {
        let a = Message::assistant();
        let b = Message::assistant();
        assert_ne!(a.id, b.id);
    }
}
