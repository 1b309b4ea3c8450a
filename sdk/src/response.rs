//! Neutral stream events decoded from provider chunks.

use serde::Deserialize;
use serde::Serialize;
use strand_protocol::FinishReason;
use strand_protocol::TokenUsage;

/// One neutral event decoded from the provider stream.
///
/// Stream corruption travels through this enum as a first-class variant
/// ([`StreamEvent::ParseWarning`]) rather than as an error that unwinds the
/// consumer: the skip-and-continue policy is `ParseWarning => log; continue`
/// at the call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A piece of answer text.
    TextDelta {
        /// The text fragment.
        delta: String,
    },
    /// A piece of hidden reasoning.
    ReasoningDelta {
        /// The reasoning fragment.
        delta: String,
    },
    /// The model opened a tool call.
    ToolCallStart {
        /// Call id, unique within the session and never reused.
        call_id: String,
        /// Tool name.
        name: String,
    },
    /// A fragment of the streamed tool arguments.
    ToolCallDelta {
        /// Call id.
        call_id: String,
        /// Raw JSON fragment of the arguments.
        arguments_delta: String,
    },
    /// The tool call's arguments are complete.
    ToolCallEnd {
        /// Call id.
        call_id: String,
    },
    /// The step finished.
    Finish {
        /// Neutral finish reason.
        reason: FinishReason,
        /// Usage for the step; unknown fields stay unknown.
        usage: TokenUsage,
    },
    /// A frame failed to decode and was skipped.
    ParseWarning {
        /// First bytes of the offending payload (at most 200).
        preview: String,
    },
    /// The provider reported a structured error mid-stream.
    StreamError {
        /// Machine-readable code.
        code: String,
        /// Description.
        message: String,
        /// Whether the retry transport may retry the step.
        retryable: bool,
    },
}

impl StreamEvent {
    /// The text delta, when this is one.
    pub fn as_text_delta(&self) -> Option<&str> {
        match self {
            StreamEvent::TextDelta { delta } => Some(delta),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tags() {
        let event = StreamEvent::ToolCallStart {
            call_id: "c1".to_string(),
            name: "read".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "tool_call_start");
    }

    #[test]
    fn test_finish_carries_usage() {
        let event = StreamEvent::Finish {
            reason: FinishReason::Stop,
            usage: TokenUsage::new(10, 2),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["usage"]["input"], 10);
        assert_eq!(json["reason"], "stop");
    }
}
