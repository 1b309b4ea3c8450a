use super::*;
use pretty_assertions::assert_eq;
use strand_bus::EventFilter;
use strand_protocol::TextPart;
use strand_protocol::ToolPart;
use strand_protocol::ToolTime;

fn store() -> SessionStore {
    SessionStore::new(EventBus::new())
}

fn spec() -> ModelSpec {
    ModelSpec::new("openai", "gpt-4o")
}

fn text_part(id: &str, completed: bool) -> Part {
    Part::Text(TextPart {
        id: id.to_string(),
        text: "hello".to_string(),
        completed,
    })
}

fn tool_part(id: &str, call_id: &str) -> Part {
    Part::Tool(ToolPart {
        id: id.to_string(),
        call_id: call_id.to_string(),
        tool: "read".to_string(),
        state: ToolState::pending(),
    })
}

#[test]
fn test_create_and_get() {
    let store = store();
    let session = store.create(spec(), Some("be brief".to_string()));

    let fetched = store.get(&session.id).unwrap();
    assert_eq!(fetched, session);
    assert_eq!(fetched.system_prompt.as_deref(), Some("be brief"));

    assert_eq!(
        store.get("nope").unwrap_err(),
        StoreError::SessionNotFound("nope".to_string())
    );
}

#[test]
fn test_fork_deep_copies_ledger_and_links_parent() {
    let store = store();
    let source = store.create(spec(), None);
    let message = Message::user(vec![text_part("p1", true)]);
    store.append_message(&source.id, message).unwrap();

    let fork = store.fork(&source.id).unwrap();
    assert_ne!(fork.id, source.id);
    assert_eq!(fork.parent_id.as_deref(), Some(source.id.as_str()));

    // The fork's ledger equals the source's at fork time.
    assert_eq!(store.ledger(&fork.id).unwrap(), store.ledger(&source.id).unwrap());

    // Appending to the fork leaves the source untouched (deep copy).
    let assistant = Message::assistant();
    store.append_message(&fork.id, assistant).unwrap();
    assert_eq!(store.ledger(&fork.id).unwrap().messages().len(), 2);
    assert_eq!(store.ledger(&source.id).unwrap().messages().len(), 1);
}

#[test]
fn test_list_recent_ordering() {
    let store = store();
    let a = store.create(spec(), None);
    std::thread::sleep(std::time::Duration::from_millis(2));
    let b = store.create(spec(), None);
    std::thread::sleep(std::time::Duration::from_millis(2));

    // Touching `a` via a mutation moves it to the front.
    store.append_message(&a.id, Message::user(vec![])).unwrap();

    let recent = store.list_recent();
    assert_eq!(recent[0].id, a.id);
    assert_eq!(recent[1].id, b.id);
}

#[test]
fn test_append_part_and_update() {
    let store = store();
    let session = store.create(spec(), None);
    let message = Message::assistant();
    let message_id = message.id.clone();
    store.append_message(&session.id, message).unwrap();

    store
        .append_part(&session.id, &message_id, text_part("p1", false))
        .unwrap();

    let updated = store
        .update_part(&session.id, "p1", |part| {
            if let Part::Text(text) = part {
                text.text.push_str(", world");
                text.completed = true;
            }
        })
        .unwrap();
    let Part::Text(text) = updated else {
        panic!("wrong part kind");
    };
    assert_eq!(text.text, "hello, world");
    assert!(text.completed);
}

#[test]
fn test_terminal_parts_are_immutable() {
    let store = store();
    let session = store.create(spec(), None);
    let message = Message::assistant();
    let message_id = message.id.clone();
    store.append_message(&session.id, message).unwrap();
    store
        .append_part(&session.id, &message_id, text_part("p1", true))
        .unwrap();

    let err = store
        .update_part(&session.id, "p1", |_| panic!("must not run"))
        .unwrap_err();
    assert_eq!(err, StoreError::PartFrozen("p1".to_string()));
}

#[test]
fn test_tool_state_machine_enforced() {
    let store = store();
    let session = store.create(spec(), None);
    let message = Message::assistant();
    let message_id = message.id.clone();
    store.append_message(&session.id, message).unwrap();
    store
        .append_part(&session.id, &message_id, tool_part("p1", "call_1"))
        .unwrap();

    // pending -> completed skips running and is rejected; the part is
    // rolled back to its previous state.
    let err = store
        .transition_tool(
            &session.id,
            "p1",
            ToolState::Completed {
                input: serde_json::json!({}),
                output: "done".to_string(),
                title: None,
                metadata: serde_json::Value::Null,
                time: ToolTime::started_at(1).ended_at(2),
            },
        )
        .unwrap_err();
    assert_eq!(
        err,
        StoreError::IllegalTransition {
            from: ToolStatus::Pending,
            to: ToolStatus::Completed,
        }
    );

    // The legal path works.
    store
        .transition_tool(
            &session.id,
            "p1",
            ToolState::Running {
                input: serde_json::json!({}),
                partial: serde_json::Value::Null,
                time: ToolTime::started_at(1),
            },
        )
        .unwrap();
    store
        .transition_tool(
            &session.id,
            "p1",
            ToolState::Completed {
                input: serde_json::json!({}),
                output: "done".to_string(),
                title: None,
                metadata: serde_json::Value::Null,
                time: ToolTime::started_at(1).ended_at(2),
            },
        )
        .unwrap();

    // Terminal now; nothing further is accepted.
    let err = store
        .transition_tool(
            &session.id,
            "p1",
            ToolState::Error {
                input: serde_json::Value::Null,
                message: "late".to_string(),
                time: ToolTime::started_at(1).ended_at(3),
            },
        )
        .unwrap_err();
    assert_eq!(err, StoreError::PartFrozen("p1".to_string()));
}

#[test]
fn test_call_ids_never_reused() {
    let store = store();
    let session = store.create(spec(), None);
    let message = Message::assistant();
    let message_id = message.id.clone();
    store.append_message(&session.id, message).unwrap();

    store
        .append_part(&session.id, &message_id, tool_part("p1", "call_1"))
        .unwrap();
    let err = store
        .append_part(&session.id, &message_id, tool_part("p2", "call_1"))
        .unwrap_err();
    assert_eq!(err, StoreError::DuplicateCallId("call_1".to_string()));
}

#[tokio::test]
async fn test_mutations_publish_snapshots() {
    let bus = EventBus::new();
    let store = SessionStore::new(bus.clone());
    let session = store.create(spec(), None);
    let mut sub = bus.subscribe(EventFilter::Session(session.id.clone()));

    let message = Message::assistant();
    let message_id = message.id.clone();
    store.append_message(&session.id, message).unwrap();
    store
        .append_part(&session.id, &message_id, text_part("p1", false))
        .unwrap();

    let created = sub.recv().await.unwrap();
    assert!(matches!(created, EngineEvent::MessageCreated { .. }));

    let updated = sub.recv().await.unwrap();
    let EngineEvent::PartUpdated { part, .. } = updated else {
        panic!("expected part update");
    };
    assert_eq!(part.id(), "p1");
}

#[test]
fn test_open_tool_parts_listed_for_cleanup() {
    let store = store();
    let session = store.create(spec(), None);
    let message = Message::assistant();
    let message_id = message.id.clone();
    store.append_message(&session.id, message).unwrap();
    store
        .append_part(&session.id, &message_id, tool_part("p1", "call_1"))
        .unwrap();

    assert_eq!(store.open_tool_parts(&session.id).unwrap(), vec!["p1".to_string()]);
}
