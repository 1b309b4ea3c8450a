//! Message parts and the tool-call state machine.
//!
//! A [`Part`] is the atomic unit inside a message: a piece of text, hidden
//! reasoning, a step boundary, a tool invocation, or an attached file. Parts
//! stream: they are created on first observation, updated while live, and
//! frozen once terminal.
//!
//! [`ToolState`] is the one authoritative enumeration of tool-call statuses.
//! Both the runtime and the wire share this declaration; a status string
//! outside the set fails deserialization instead of leaking into the ledger.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::usage::CostTotal;
use crate::usage::TokenUsage;

/// Why the model ended a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    /// The model finished its answer.
    Stop,
    /// The output token limit was reached.
    Length,
    /// The model requested tool execution.
    ToolUse,
    /// The step ended on an error.
    Error,
    /// The provider reported a reason outside the neutral set.
    Unknown,
}

impl FinishReason {
    /// Get the reason as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ToolUse => "tool-use",
            FinishReason::Error => "error",
            FinishReason::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Start/end wall-clock timestamps for a tool call, in Unix milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolTime {
    /// When execution started.
    pub start: i64,
    /// When execution reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<i64>,
}

impl ToolTime {
    /// A time range that started now-ish and has not ended.
    pub fn started_at(start: i64) -> Self {
        Self { start, end: None }
    }

    /// Close the range.
    pub fn ended_at(mut self, end: i64) -> Self {
        self.end = Some(end);
        self
    }
}

/// Fieldless view of a tool-call status, for transition checks and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    /// Arguments are still streaming in.
    Pending,
    /// The tool is executing.
    Running,
    /// The tool finished successfully.
    Completed,
    /// The tool failed.
    Error,
    /// The tool was cancelled before finishing.
    Aborted,
}

impl ToolStatus {
    /// Get the status as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolStatus::Pending => "pending",
            ToolStatus::Running => "running",
            ToolStatus::Completed => "completed",
            ToolStatus::Error => "error",
            ToolStatus::Aborted => "aborted",
        }
    }

    /// Whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ToolStatus::Completed | ToolStatus::Error | ToolStatus::Aborted
        )
    }

    /// Whether a transition from `self` to `next` is legal.
    ///
    /// The machine is `pending -> running -> (completed | error | aborted)`.
    /// Cleanup may also fail or abort a call that never started running, so
    /// `pending -> error` and `pending -> aborted` are legal. Terminal states
    /// accept nothing.
    pub fn can_transition_to(&self, next: ToolStatus) -> bool {
        match self {
            ToolStatus::Pending => matches!(
                next,
                ToolStatus::Running | ToolStatus::Error | ToolStatus::Aborted
            ),
            ToolStatus::Running => next.is_terminal(),
            ToolStatus::Completed | ToolStatus::Error | ToolStatus::Aborted => false,
        }
    }
}

impl std::fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// State of a tool invocation, discriminated on `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolState {
    /// Arguments are streaming; `input_fragments` accumulates the raw JSON.
    Pending {
        /// Argument JSON fragments in arrival order.
        #[serde(default)]
        input_fragments: Vec<String>,
    },
    /// The call is executing.
    Running {
        /// Parsed arguments.
        input: Value,
        /// In-flight state published by the tool via `publishPartial`.
        #[serde(default, skip_serializing_if = "Value::is_null")]
        partial: Value,
        /// Execution timestamps.
        time: ToolTime,
    },
    /// The call finished successfully.
    Completed {
        /// Parsed arguments.
        input: Value,
        /// Output text fed back to the model.
        output: String,
        /// Human-readable result title.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        /// Opaque structured metadata for observers.
        #[serde(default)]
        metadata: Value,
        /// Execution timestamps.
        time: ToolTime,
    },
    /// The call failed.
    Error {
        /// Parsed arguments (may be `null` if argument assembly failed).
        input: Value,
        /// Failure description.
        message: String,
        /// Execution timestamps.
        time: ToolTime,
    },
    /// The call was cancelled.
    Aborted {
        /// Parsed arguments (may be `null` if argument assembly failed).
        input: Value,
        /// Execution timestamps.
        time: ToolTime,
    },
}

impl ToolState {
    /// A fresh pending state with no arguments yet.
    pub fn pending() -> Self {
        ToolState::Pending {
            input_fragments: Vec::new(),
        }
    }

    /// The fieldless status of this state.
    pub fn status(&self) -> ToolStatus {
        match self {
            ToolState::Pending { .. } => ToolStatus::Pending,
            ToolState::Running { .. } => ToolStatus::Running,
            ToolState::Completed { .. } => ToolStatus::Completed,
            ToolState::Error { .. } => ToolStatus::Error,
            ToolState::Aborted { .. } => ToolStatus::Aborted,
        }
    }

    /// Whether this state is terminal.
    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// The parsed input, when past pending.
    pub fn input(&self) -> Option<&Value> {
        match self {
            ToolState::Pending { .. } => None,
            ToolState::Running { input, .. }
            | ToolState::Completed { input, .. }
            | ToolState::Error { input, .. }
            | ToolState::Aborted { input, .. } => Some(input),
        }
    }

    /// The execution time range, when past pending.
    pub fn time(&self) -> Option<ToolTime> {
        match self {
            ToolState::Pending { .. } => None,
            ToolState::Running { time, .. }
            | ToolState::Completed { time, .. }
            | ToolState::Error { time, .. }
            | ToolState::Aborted { time, .. } => Some(*time),
        }
    }
}

/// A piece of model- or user-emitted prose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPart {
    /// Part identifier, unique within the session.
    pub id: String,
    /// Accumulated text.
    pub text: String,
    /// Whether the part has finished streaming.
    #[serde(default)]
    pub completed: bool,
}

/// Hidden chain-of-thought; same shape as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningPart {
    /// Part identifier, unique within the session.
    pub id: String,
    /// Accumulated reasoning text.
    pub text: String,
    /// Whether the part has finished streaming.
    #[serde(default)]
    pub completed: bool,
}

/// Marks the beginning of a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepStartPart {
    /// Part identifier, unique within the session.
    pub id: String,
    /// 1-indexed step number within the turn.
    pub step: i32,
}

/// Marks the end of a step, carrying its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFinishPart {
    /// Part identifier, unique within the session.
    pub id: String,
    /// 1-indexed step number within the turn.
    pub step: i32,
    /// Neutral finish reason.
    pub reason: FinishReason,
    /// Token usage for the step.
    pub tokens: TokenUsage,
    /// Computed cost, or unknown.
    pub cost: CostTotal,
}

/// A tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolPart {
    /// Part identifier, unique within the session.
    pub id: String,
    /// Provider-assigned call id, unique within the session and never reused.
    pub call_id: String,
    /// Tool name.
    pub tool: String,
    /// Current state.
    pub state: ToolState,
}

/// An attached resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilePart {
    /// Part identifier, unique within the session.
    pub id: String,
    /// Mime type of the attachment.
    pub mime: String,
    /// Original filename, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Source location or inline data URL.
    pub source: String,
}

/// An atomic, typed unit within a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    /// Prose.
    Text(TextPart),
    /// Hidden chain-of-thought.
    Reasoning(ReasoningPart),
    /// Step boundary: start.
    StepStart(StepStartPart),
    /// Step boundary: end.
    StepFinish(StepFinishPart),
    /// Tool invocation.
    Tool(ToolPart),
    /// Attached resource.
    File(FilePart),
}

/// Fieldless view of a part's kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartKind {
    Text,
    Reasoning,
    StepStart,
    StepFinish,
    Tool,
    File,
}

impl Part {
    /// The part identifier.
    pub fn id(&self) -> &str {
        match self {
            Part::Text(p) => &p.id,
            Part::Reasoning(p) => &p.id,
            Part::StepStart(p) => &p.id,
            Part::StepFinish(p) => &p.id,
            Part::Tool(p) => &p.id,
            Part::File(p) => &p.id,
        }
    }

    /// The part kind.
    pub fn kind(&self) -> PartKind {
        match self {
            Part::Text(_) => PartKind::Text,
            Part::Reasoning(_) => PartKind::Reasoning,
            Part::StepStart(_) => PartKind::StepStart,
            Part::StepFinish(_) => PartKind::StepFinish,
            Part::Tool(_) => PartKind::Tool,
            Part::File(_) => PartKind::File,
        }
    }

    /// Whether the part may no longer be mutated.
    ///
    /// Text and reasoning freeze when completed; tool parts freeze in a
    /// terminal state; step boundaries and files are immutable from creation.
    pub fn is_frozen(&self) -> bool {
        match self {
            Part::Text(p) => p.completed,
            Part::Reasoning(p) => p.completed,
            Part::StepStart(_) | Part::StepFinish(_) | Part::File(_) => true,
            Part::Tool(p) => p.state.is_terminal(),
        }
    }
}

#[cfg(test)]
#[path = "part.test.rs"]
mod tests;
