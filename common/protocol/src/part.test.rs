use super::*;
use pretty_assertions::assert_eq;

#[test]
fn test_status_transitions_from_pending() {
    let pending = ToolStatus::Pending;
    assert!(pending.can_transition_to(ToolStatus::Running));
    assert!(pending.can_transition_to(ToolStatus::Error));
    assert!(pending.can_transition_to(ToolStatus::Aborted));
    assert!(!pending.can_transition_to(ToolStatus::Pending));
    assert!(!pending.can_transition_to(ToolStatus::Completed));
}

#[test]
fn test_status_transitions_from_running() {
    let running = ToolStatus::Running;
    assert!(running.can_transition_to(ToolStatus::Completed));
    assert!(running.can_transition_to(ToolStatus::Error));
    assert!(running.can_transition_to(ToolStatus::Aborted));
    assert!(!running.can_transition_to(ToolStatus::Pending));
    assert!(!running.can_transition_to(ToolStatus::Running));
}

#[test]
fn test_terminal_states_accept_nothing() {
    for terminal in [ToolStatus::Completed, ToolStatus::Error, ToolStatus::Aborted] {
        for next in [
            ToolStatus::Pending,
            ToolStatus::Running,
            ToolStatus::Completed,
            ToolStatus::Error,
            ToolStatus::Aborted,
        ] {
            assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
        }
    }
}

#[test]
fn test_tool_state_status_tag() {
    let state = ToolState::Running {
        input: serde_json::json!({"file_path": "/tmp/x"}),
        partial: serde_json::Value::Null,
        time: ToolTime::started_at(1_000),
    };
    let json = serde_json::to_value(&state).unwrap();
    assert_eq!(json["status"], "running");
    assert_eq!(json["input"]["file_path"], "/tmp/x");
}

#[test]
fn test_unenumerated_status_rejected() {
    // "failed" was never a legal status; the schema is the single source of
    // truth, so deserialization must refuse it.
    let result: Result<ToolState, _> =
        serde_json::from_value(serde_json::json!({"status": "failed", "input": {}}));
    assert!(result.is_err());
}

#[test]
fn test_tool_state_roundtrip() {
    let states = vec![
        ToolState::pending(),
        ToolState::Running {
            input: serde_json::json!({}),
            partial: serde_json::Value::Null,
            time: ToolTime::started_at(5),
        },
        ToolState::Completed {
            input: serde_json::json!({"q": 1}),
            output: "done".to_string(),
            title: Some("title".to_string()),
            metadata: serde_json::json!({"lines": 3}),
            time: ToolTime::started_at(5).ended_at(9),
        },
        ToolState::Error {
            input: serde_json::Value::Null,
            message: "boom".to_string(),
            time: ToolTime::started_at(5).ended_at(6),
        },
        ToolState::Aborted {
            input: serde_json::Value::Null,
            time: ToolTime::started_at(5).ended_at(6),
        },
    ];
    for state in states {
        let json = serde_json::to_string(&state).unwrap();
        let back: ToolState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}

#[test]
fn test_part_tag_names() {
    let part = Part::StepFinish(StepFinishPart {
        id: "p1".to_string(),
        step: 1,
        reason: FinishReason::Stop,
        tokens: crate::usage::TokenUsage::new(10, 2),
        cost: crate::usage::CostTotal::Unknown,
    });
    let json = serde_json::to_value(&part).unwrap();
    assert_eq!(json["type"], "step_finish");
    assert_eq!(json["reason"], "stop");
    assert_eq!(json["cost"], "unknown");
}

#[test]
fn test_finish_reason_kebab_case() {
    assert_eq!(
        serde_json::to_value(FinishReason::ToolUse).unwrap(),
        serde_json::json!("tool-use")
    );
}

#[test]
fn test_part_frozen_rules() {
    let streaming = Part::Text(TextPart {
        id: "t".to_string(),
        text: "hi".to_string(),
        completed: false,
    });
    assert!(!streaming.is_frozen());

    let done = Part::Text(TextPart {
        id: "t".to_string(),
        text: "hi".to_string(),
        completed: true,
    });
    assert!(done.is_frozen());

    let running_tool = Part::Tool(ToolPart {
        id: "p".to_string(),
        call_id: "c".to_string(),
        tool: "read".to_string(),
        state: ToolState::Running {
            input: serde_json::json!({}),
            partial: serde_json::Value::Null,
            time: ToolTime::started_at(0),
        },
    });
    assert!(!running_tool.is_frozen());

    let aborted_tool = Part::Tool(ToolPart {
        id: "p".to_string(),
        call_id: "c".to_string(),
        tool: "read".to_string(),
        state: ToolState::Aborted {
            input: serde_json::Value::Null,
            time: ToolTime::started_at(0).ended_at(1),
        },
    });
    assert!(aborted_tool.is_frozen());
}
