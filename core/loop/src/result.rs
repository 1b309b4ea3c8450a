//! Turn outcomes.

use serde::Deserialize;
use serde::Serialize;
use strand_protocol::TokenUsage;

/// Why a turn stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    /// The model finished its answer.
    Completed,
    /// The step ceiling was reached.
    MaxSteps,
    /// The user interrupted the turn.
    Interrupted,
    /// The turn failed.
    Error {
        /// Description of the failure.
        message: String,
        /// Whether the session cannot continue (e.g. retry budget elapsed).
        fatal: bool,
    },
}

/// The result of one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnResult {
    /// Steps executed.
    pub steps: i32,
    /// Concatenated answer text across all steps.
    pub final_text: String,
    /// Aggregate usage; unknown where any step's usage was unknown.
    pub usage: TokenUsage,
    /// Why the turn stopped.
    pub stop_reason: StopReason,
}

impl TurnResult {
    /// Whether the turn ended in a failure.
    pub fn is_error(&self) -> bool {
        matches!(self.stop_reason, StopReason::Error { .. })
    }

    /// Whether the failure was fatal for the session.
    pub fn is_fatal(&self) -> bool {
        matches!(self.stop_reason, StopReason::Error { fatal: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_reason_flags() {
        let completed = TurnResult {
            steps: 1,
            final_text: "hi".to_string(),
            usage: TokenUsage::new(1, 1),
            stop_reason: StopReason::Completed,
        };
        assert!(!completed.is_error());
        assert!(!completed.is_fatal());

        let fatal = TurnResult {
            steps: 1,
            final_text: String::new(),
            usage: TokenUsage::unknown(),
            stop_reason: StopReason::Error {
                message: "retry budget exhausted".to_string(),
                fatal: true,
            },
        };
        assert!(fatal.is_error());
        assert!(fatal.is_fatal());
    }

    #[test]
    fn test_serialization_tag() {
        let json = serde_json::to_value(StopReason::MaxSteps).unwrap();
        assert_eq!(json["reason"], "max_steps");
    }
}
