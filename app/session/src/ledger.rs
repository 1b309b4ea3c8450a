//! The per-session message ledger and its request-building view.

use serde::Deserialize;
use serde::Serialize;
use strand_protocol::Message;
use strand_protocol::Part;
use strand_protocol::Role;
use strand_protocol::ToolState;

/// Append-only ordered message sequence for one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageLedger {
    messages: Vec<Message>,
}

impl MessageLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Append a message and return a reference to it.
    pub fn push(&mut self, message: Message) -> &Message {
        self.messages.push(message);
        let index = self.messages.len() - 1;
        &self.messages[index]
    }

    /// Find a message by id.
    pub fn message(&self, message_id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == message_id)
    }

    /// Find a message by id, mutably.
    pub fn message_mut(&mut self, message_id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == message_id)
    }

    /// Find a part anywhere in the ledger, with its owning message id.
    pub fn find_part(&self, part_id: &str) -> Option<(&str, &Part)> {
        for message in &self.messages {
            if let Some(part) = message.part(part_id) {
                return Some((message.id.as_str(), part));
            }
        }
        None
    }

    /// Whether a tool call id already exists anywhere in the ledger.
    pub fn has_call_id(&self, call_id: &str) -> bool {
        self.messages.iter().any(|m| {
            m.parts.iter().any(|p| match p {
                Part::Tool(tool) => tool.call_id == call_id,
                _ => false,
            })
        })
    }

    /// Tool parts of the ledger still in a non-terminal state.
    pub fn open_tool_part_ids(&self) -> Vec<String> {
        self.messages
            .iter()
            .flat_map(|m| m.parts.iter())
            .filter_map(|p| match p {
                Part::Tool(tool) if !tool.state.is_terminal() => Some(tool.id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Build the provider-neutral message list for the next request.
    ///
    /// Assistant tool parts become `tool_use` blocks followed by a tool
    /// message carrying their results; error and aborted calls feed an error
    /// result back so the model can recover in the next step.
    pub fn to_request_messages(&self) -> Vec<strand_sdk::Message> {
        let mut out = Vec::new();

        for message in &self.messages {
            match message.role {
                Role::User => {
                    let text = concat_text(message);
                    if !text.is_empty() {
                        out.push(strand_sdk::Message::user(text));
                    }
                }
                Role::Assistant => {
                    let mut blocks = Vec::new();
                    let mut results = Vec::new();

                    for part in &message.parts {
                        match part {
                            Part::Text(p) => {
                                if !p.text.is_empty() {
                                    blocks.push(strand_sdk::ContentBlock::text(p.text.clone()));
                                }
                            }
                            Part::Tool(tool) => {
                                let input = tool
                                    .state
                                    .input()
                                    .cloned()
                                    .unwrap_or(serde_json::Value::Null);
                                blocks.push(strand_sdk::ContentBlock::tool_use(
                                    tool.call_id.clone(),
                                    tool.tool.clone(),
                                    input,
                                ));
                                results.push(tool_result_block(tool));
                            }
                            // Reasoning, step markers, and files are not
                            // replayed to the provider.
                            _ => {}
                        }
                    }

                    if !blocks.is_empty() {
                        out.push(strand_sdk::Message::assistant(blocks));
                    }
                    if !results.is_empty() {
                        out.push(strand_sdk::Message::tool_results(results));
                    }
                }
            }
        }

        out
    }
}

fn concat_text(message: &Message) -> String {
    message
        .parts
        .iter()
        .filter_map(|p| match p {
            Part::Text(t) => Some(t.text.as_str()),
            _ => None,
        })
        .collect()
}

fn tool_result_block(tool: &strand_protocol::ToolPart) -> strand_sdk::ContentBlock {
    match &tool.state {
        ToolState::Completed { output, .. } => {
            strand_sdk::ContentBlock::tool_result(tool.call_id.clone(), output.clone(), false)
        }
        ToolState::Error { message, .. } => strand_sdk::ContentBlock::tool_result(
            tool.call_id.clone(),
            format!("Tool error: {message}"),
            true,
        ),
        ToolState::Aborted { .. } => strand_sdk::ContentBlock::tool_result(
            tool.call_id.clone(),
            "Tool execution was aborted".to_string(),
            true,
        ),
        // Open calls have no result yet; the model sees nothing for them.
        ToolState::Pending { .. } | ToolState::Running { .. } => {
            strand_sdk::ContentBlock::tool_result(
                tool.call_id.clone(),
                "Tool execution did not finish".to_string(),
                true,
            )
        }
    }
}

#[cfg(test)]
#[path = "ledger.test.rs"]
mod tests;
