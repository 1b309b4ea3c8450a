use super::*;
use pretty_assertions::assert_eq;
use strand_protocol::CostTotal;
use strand_protocol::EngineError;
use strand_protocol::FinishReason;
use strand_protocol::StepFinishPart;
use strand_protocol::StepStartPart;
use strand_protocol::TextPart;
use strand_protocol::TokenUsage;
use strand_protocol::ToolPart;
use strand_protocol::ToolState;
use strand_protocol::ToolTime;

fn part_event(part: Part) -> EngineEvent {
    EngineEvent::PartUpdated {
        session_id: "s1".to_string(),
        message_id: "m1".to_string(),
        part,
    }
}

fn render_json(emitter: &OutputEmitter, event: &EngineEvent) -> Value {
    serde_json::from_str(&emitter.render(event).expect("event not rendered")).unwrap()
}

#[test]
fn test_text_event_dialect_o() {
    let emitter = OutputEmitter::new(Dialect::O, true);
    let event = part_event(Part::Text(TextPart {
        id: "p1".to_string(),
        text: "hello".to_string(),
        completed: false,
    }));

    let json = render_json(&emitter, &event);
    assert_eq!(json["type"], "text");
    assert_eq!(json["sessionID"], "s1");
    assert!(json["timestamp"].as_i64().unwrap() > 0);
    assert_eq!(json["part"]["text"], "hello");
}

#[test]
fn test_step_events_dialect_o() {
    let emitter = OutputEmitter::new(Dialect::O, true);

    let start = render_json(
        &emitter,
        &part_event(Part::StepStart(StepStartPart {
            id: "p1".to_string(),
            step: 1,
        })),
    );
    assert_eq!(start["type"], "step_start");

    let finish = render_json(
        &emitter,
        &part_event(Part::StepFinish(StepFinishPart {
            id: "p2".to_string(),
            step: 1,
            reason: FinishReason::Stop,
            tokens: TokenUsage::new(120, 8),
            cost: CostTotal::Unknown,
        })),
    );
    assert_eq!(finish["type"], "step_finish");
    assert_eq!(finish["part"]["reason"], "stop");
    assert_eq!(finish["part"]["tokens"]["input"], 120);
    assert_eq!(finish["part"]["tokens"]["output"], 8);
    assert_eq!(finish["part"]["tokens"]["reasoning"], "unknown");
    assert_eq!(finish["part"]["tokens"]["cache"]["read"], "unknown");
    assert_eq!(finish["part"]["cost"], "unknown");
}

#[test]
fn test_tool_use_event_lifts_time() {
    let emitter = OutputEmitter::new(Dialect::O, true);
    let event = part_event(Part::Tool(ToolPart {
        id: "p1".to_string(),
        call_id: "call_1".to_string(),
        tool: "read".to_string(),
        state: ToolState::Completed {
            input: serde_json::json!({"file_path": "/tmp/x"}),
            output: "contents".to_string(),
            title: None,
            metadata: Value::Null,
            time: ToolTime::started_at(100).ended_at(250),
        },
    }));

    let json = render_json(&emitter, &event);
    assert_eq!(json["type"], "tool_use");
    assert_eq!(json["part"]["tool"], "read");
    assert_eq!(json["part"]["state"]["status"], "completed");
    assert_eq!(json["part"]["state"]["input"]["file_path"], "/tmp/x");
    assert_eq!(json["part"]["state"]["output"], "contents");
    assert_eq!(json["part"]["time"]["start"], 100);
    assert_eq!(json["part"]["time"]["end"], 250);
}

#[test]
fn test_status_and_error_events() {
    let emitter = OutputEmitter::new(Dialect::O, true);

    let idle = render_json(
        &emitter,
        &EngineEvent::SessionIdle {
            session_id: "s1".to_string(),
        },
    );
    assert_eq!(idle["type"], "status");
    assert_eq!(idle["status"]["status"], "idle");

    let error = render_json(
        &emitter,
        &EngineEvent::SessionError {
            session_id: "s1".to_string(),
            error: EngineError::fatal("budget_exhausted", "retry budget elapsed"),
        },
    );
    assert_eq!(error["type"], "error");
    assert_eq!(error["error"]["code"], "budget_exhausted");
    assert_eq!(error["error"]["recoverable"], false);
}

#[test]
fn test_internal_events_not_rendered() {
    let emitter = OutputEmitter::new(Dialect::O, true);
    assert!(
        emitter
            .render(&EngineEvent::SubscriberOverflow {
                subscriber_id: 1,
                dropped: 5,
            })
            .is_none()
    );
    assert!(
        emitter
            .render(&EngineEvent::Diagnostic {
                session_id: None,
                level: strand_protocol::DiagnosticLevel::Warning,
                message: "skip".to_string(),
            })
            .is_none()
    );
}

#[test]
fn test_dialect_c_shape() {
    let emitter = OutputEmitter::new(Dialect::C, true);
    let event = part_event(Part::Text(TextPart {
        id: "p1".to_string(),
        text: "hello".to_string(),
        completed: true,
    }));

    let json = render_json(&emitter, &event);
    assert_eq!(json["t"], "text");
    assert_eq!(json["sid"], "s1");
    assert!(json.get("type").is_none());
    assert_eq!(json["data"]["text"], "hello");
}

#[test]
fn test_pretty_output_is_multiline_compact_is_single() {
    let event = part_event(Part::Text(TextPart {
        id: "p1".to_string(),
        text: "x".to_string(),
        completed: true,
    }));

    let pretty = OutputEmitter::new(Dialect::O, false).render(&event).unwrap();
    assert!(pretty.contains('\n'));
    assert!(pretty.contains("  \"type\""));

    let compact = OutputEmitter::new(Dialect::O, true).render(&event).unwrap();
    assert!(!compact.contains('\n'));
}
