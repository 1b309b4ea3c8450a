//! The output emitter.
//!
//! Subscribes to the bus, filtered by session, and serializes events as JSON
//! on stdout, one object per emission. Two dialects:
//!
//! - **Dialect O** (default): `{type, timestamp, sessionID, part}` with
//!   `type` in `{step_start, step_finish, text, tool_use, error, status}`
//! - **Dialect C**: a compact variant, `{t, ts, sid, data}`
//!
//! Pretty-printing (2-space indent) is the default; object boundaries stay
//! unambiguous because only top-level objects are emitted. Status messages
//! and warnings go to stderr, never stdout.

use serde_json::Value;
use serde_json::json;
use strand_bus::Subscription;
use strand_protocol::EngineEvent;
use strand_protocol::Part;
use strand_protocol::PartKind;
use strand_protocol::now_ms;
use tracing::warn;

/// Output dialect selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Dialect {
    /// The default event schema.
    O,
    /// The compact variant.
    C,
}

/// Renders engine events as JSON lines.
#[derive(Debug, Clone, Copy)]
pub struct OutputEmitter {
    dialect: Dialect,
    compact: bool,
}

impl OutputEmitter {
    /// Create an emitter.
    pub fn new(dialect: Dialect, compact: bool) -> Self {
        Self { dialect, compact }
    }

    /// Render an event, or `None` for events outside the stdout stream
    /// (internal diagnostics, message scaffolding).
    pub fn render(&self, event: &EngineEvent) -> Option<String> {
        let rendered = self.to_json(event)?;
        Some(if self.compact {
            rendered.to_string()
        } else {
            serde_json::to_string_pretty(&rendered).unwrap_or_else(|_| rendered.to_string())
        })
    }

    fn to_json(&self, event: &EngineEvent) -> Option<Value> {
        match event {
            EngineEvent::PartUpdated {
                session_id, part, ..
            } => {
                let event_type = match part.kind() {
                    PartKind::Text | PartKind::Reasoning => "text",
                    PartKind::StepStart => "step_start",
                    PartKind::StepFinish => "step_finish",
                    PartKind::Tool => "tool_use",
                    // Attachments are inputs, not stream output.
                    PartKind::File => return None,
                };
                Some(self.envelope(event_type, session_id, part_payload(part)))
            }
            EngineEvent::SessionIdle { session_id } => {
                Some(self.envelope("status", session_id, json!({ "status": "idle" })))
            }
            EngineEvent::SessionError { session_id, error } => Some(self.envelope(
                "error",
                session_id,
                json!({
                    "code": error.code,
                    "message": error.message,
                    "recoverable": error.recoverable,
                }),
            )),
            // Scaffolding and internals: not part of the stdout stream.
            EngineEvent::MessageCreated { .. }
            | EngineEvent::SubscriberOverflow { .. }
            | EngineEvent::Diagnostic { .. } => None,
        }
    }

    fn envelope(&self, event_type: &str, session_id: &str, payload: Value) -> Value {
        match self.dialect {
            Dialect::O => {
                let key = match event_type {
                    "error" => "error",
                    "status" => "status",
                    _ => "part",
                };
                let mut envelope = json!({
                    "type": event_type,
                    "timestamp": now_ms(),
                    "sessionID": session_id,
                });
                envelope[key] = payload;
                envelope
            }
            Dialect::C => json!({
                "t": event_type,
                "ts": now_ms(),
                "sid": session_id,
                "data": payload,
            }),
        }
    }
}

/// Serialize a part, lifting the tool execution time range up to
/// `part.time` so observers need not dig through the state union.
fn part_payload(part: &Part) -> Value {
    let mut value = serde_json::to_value(part).unwrap_or(Value::Null);
    if let Part::Tool(tool) = part {
        if let Some(time) = tool.state.time() {
            if let Ok(time_value) = serde_json::to_value(time) {
                value["time"] = time_value;
            }
        }
    }
    value
}

/// Drain a subscription to stdout until the bus closes.
pub async fn pump(mut subscription: Subscription, emitter: OutputEmitter) {
    use std::io::Write;

    let stdout = std::io::stdout();
    while let Some(event) = subscription.recv().await {
        if let EngineEvent::SubscriberOverflow { dropped, .. } = &event {
            warn!(dropped, "Output subscriber overflowed; events were dropped");
            continue;
        }
        if let Some(line) = emitter.render(&event) {
            let mut lock = stdout.lock();
            let _ = writeln!(lock, "{line}");
            let _ = lock.flush();
        }
    }
}

#[cfg(test)]
#[path = "output.test.rs"]
mod tests;
