use super::*;
use pretty_assertions::assert_eq;
use strand_protocol::TextPart;
use strand_protocol::ToolPart;
use strand_protocol::ToolTime;

fn text_part(id: &str, text: &str) -> Part {
    Part::Text(TextPart {
        id: id.to_string(),
        text: text.to_string(),
        completed: true,
    })
}

fn tool_part(id: &str, call_id: &str, state: ToolState) -> Part {
    Part::Tool(ToolPart {
        id: id.to_string(),
        call_id: call_id.to_string(),
        tool: "read".to_string(),
        state,
    })
}

#[test]
fn test_push_and_lookup() {
    let mut ledger = MessageLedger::new();
    let message = Message::user(vec![text_part("p1", "hi")]);
    let id = message.id.clone();
    ledger.push(message);

    assert!(ledger.message(&id).is_some());
    let (owner, part) = ledger.find_part("p1").unwrap();
    assert_eq!(owner, id);
    assert_eq!(part.id(), "p1");
}

#[test]
fn test_call_id_tracking() {
    let mut ledger = MessageLedger::new();
    let mut message = Message::assistant();
    message.parts.push(tool_part("p1", "call_1", ToolState::pending()));
    ledger.push(message);

    assert!(ledger.has_call_id("call_1"));
    assert!(!ledger.has_call_id("call_2"));
    assert_eq!(ledger.open_tool_part_ids(), vec!["p1".to_string()]);
}

#[test]
fn test_request_messages_roundtrip_tool_results() {
    let mut ledger = MessageLedger::new();
    ledger.push(Message::user(vec![text_part("p0", "read the file")]));

    let mut assistant = Message::assistant();
    assistant.parts.push(text_part("p1", "Reading."));
    assistant.parts.push(tool_part(
        "p2",
        "call_1",
        ToolState::Completed {
            input: serde_json::json!({"file_path": "/tmp/x"}),
            output: "contents".to_string(),
            title: None,
            metadata: serde_json::Value::Null,
            time: ToolTime::started_at(1).ended_at(2),
        },
    ));
    ledger.push(assistant);

    let wire = ledger.to_request_messages();
    assert_eq!(wire.len(), 3);

    assert_eq!(wire[0].role, strand_sdk::Role::User);
    assert_eq!(wire[0].text(), "read the file");

    assert_eq!(wire[1].role, strand_sdk::Role::Assistant);
    assert!(matches!(
        &wire[1].content[1],
        strand_sdk::ContentBlock::ToolUse { id, name, .. } if id == "call_1" && name == "read"
    ));

    assert_eq!(wire[2].role, strand_sdk::Role::Tool);
    assert!(matches!(
        &wire[2].content[0],
        strand_sdk::ContentBlock::ToolResult { call_id, content, is_error: false }
            if call_id == "call_1" && content == "contents"
    ));
}

#[test]
fn test_error_and_aborted_results_flagged() {
    let mut ledger = MessageLedger::new();
    let mut assistant = Message::assistant();
    assistant.parts.push(tool_part(
        "p1",
        "call_1",
        ToolState::Error {
            input: serde_json::Value::Null,
            message: "boom".to_string(),
            time: ToolTime::started_at(1).ended_at(2),
        },
    ));
    assistant.parts.push(tool_part(
        "p2",
        "call_2",
        ToolState::Aborted {
            input: serde_json::Value::Null,
            time: ToolTime::started_at(1).ended_at(2),
        },
    ));
    ledger.push(assistant);

    let wire = ledger.to_request_messages();
    let results = &wire[1];
    assert!(matches!(
        &results.content[0],
        strand_sdk::ContentBlock::ToolResult { is_error: true, content, .. } if content.contains("boom")
    ));
    assert!(matches!(
        &results.content[1],
        strand_sdk::ContentBlock::ToolResult { is_error: true, .. }
    ));
}

#[test]
fn test_reasoning_not_replayed() {
    let mut ledger = MessageLedger::new();
    let mut assistant = Message::assistant();
    assistant.parts.push(Part::Reasoning(strand_protocol::ReasoningPart {
        id: "r1".to_string(),
        text: "secret thoughts".to_string(),
        completed: true,
    }));
    assistant.parts.push(text_part("p1", "answer"));
    ledger.push(assistant);

    let wire = ledger.to_request_messages();
    assert_eq!(wire.len(), 1);
    assert_eq!(wire[0].text(), "answer");
}
