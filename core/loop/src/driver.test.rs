use super::*;
use async_trait::async_trait;
use futures::StreamExt;
use pretty_assertions::assert_eq;
use std::collections::VecDeque;
use strand_api::ApiClientConfig;
use strand_api::RetryConfig;
use strand_bus::EventBus;
use strand_bus::EventFilter;
use strand_bus::Subscription;
use strand_protocol::ModelSpec;
use strand_protocol::ToolStatus;
use strand_sdk::SdkError;
use strand_sdk::provider::EventStream;
use strand_tools::Tool;

// ============================================================================
// Test doubles
// ============================================================================

enum Script {
    /// Stream these events, then end.
    Events(Vec<StreamEvent>),
    /// Stream these events, then hang until cancelled.
    EventsThenHang(Vec<StreamEvent>),
    /// Fail the request outright.
    Fail(fn() -> SdkError),
}

struct ScriptedModel {
    scripts: Mutex<VecDeque<Script>>,
    requests: Arc<Mutex<Vec<GenerateRequest>>>,
}

impl ScriptedModel {
    fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl Model for ScriptedModel {
    fn provider_id(&self) -> &str {
        "mock"
    }

    fn model_id(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, request: GenerateRequest) -> strand_sdk::Result<EventStream> {
        self.requests.lock().unwrap().push(request);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Events(Vec::new()));
        match script {
            Script::Events(events) => {
                Ok(Box::pin(futures::stream::iter(events.into_iter().map(Ok))))
            }
            Script::EventsThenHang(events) => Ok(Box::pin(
                futures::stream::iter(events.into_iter().map(Ok))
                    .chain(futures::stream::pending()),
            )),
            Script::Fail(make_error) => Err(make_error()),
        }
    }
}

struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the message back"
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": { "message": {"type": "string"} },
            "required": ["message"]
        })
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        Ok(ToolOutput::text(
            input["message"].as_str().unwrap_or_default(),
        ))
    }
}

struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "explode"
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({"type": "object"})
    }

    async fn execute(&self, _input: Value, _ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        Err(ToolError::execution_failed("boom"))
    }
}

struct SleepyTool;

#[async_trait]
impl Tool for SleepyTool {
    fn name(&self) -> &str {
        "sleepy"
    }

    fn description(&self) -> &str {
        "Sleeps until cancelled"
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({"type": "object"})
    }

    async fn execute(&self, _input: Value, _ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        Ok(ToolOutput::text("never"))
    }
}

struct Harness {
    store: Arc<SessionStore>,
    session_id: String,
    requests: Arc<Mutex<Vec<GenerateRequest>>>,
    processor: SessionProcessor,
    events: Subscription,
}

fn harness(scripts: Vec<Script>, tools: ToolRegistry, config: ProcessorConfig) -> Harness {
    harness_with_client(scripts, tools, config, fast_client())
}

fn harness_with_client(
    scripts: Vec<Script>,
    tools: ToolRegistry,
    config: ProcessorConfig,
    client: ApiClient,
) -> Harness {
    let bus = EventBus::new();
    let store = Arc::new(SessionStore::new(bus.clone()));
    let session = store.create(ModelSpec::new("openai", "gpt-4o"), None);
    let events = bus.subscribe(EventFilter::Session(session.id.clone()));
    let model = Arc::new(ScriptedModel::new(scripts));
    let requests = model.requests.clone();

    let processor = SessionProcessor::builder()
        .store(store.clone())
        .session_id(session.id.clone())
        .model(model)
        .api_client(client)
        .tools(Arc::new(tools))
        .config(config)
        .build();

    Harness {
        store,
        session_id: session.id,
        requests,
        processor,
        events,
    }
}

fn fast_client() -> ApiClient {
    ApiClient::with_config(ApiClientConfig::default().with_retry(
        RetryConfig::default()
            .with_base_delay(std::time::Duration::from_millis(5))
            .with_min_interval(std::time::Duration::ZERO)
            .with_jitter_ratio(0.0),
    ))
}

fn drain(events: &mut Subscription) -> Vec<EngineEvent> {
    let mut collected = Vec::new();
    while let Some(event) = events.try_recv() {
        collected.push(event);
    }
    collected
}

fn tool_statuses(events: &[EngineEvent]) -> Vec<ToolStatus> {
    events
        .iter()
        .filter_map(|event| match event {
            EngineEvent::PartUpdated {
                part: Part::Tool(tool),
                ..
            } => Some(tool.state.status()),
            _ => None,
        })
        .collect()
}

fn step_finishes(events: &[EngineEvent]) -> Vec<StepFinishPart> {
    events
        .iter()
        .filter_map(|event| match event {
            EngineEvent::PartUpdated {
                part: Part::StepFinish(finish),
                ..
            } => Some(finish.clone()),
            _ => None,
        })
        .collect()
}

fn stop_usage() -> TokenUsage {
    TokenUsage::new(9, 2)
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_hello_turn() {
    let mut h = harness(
        vec![Script::Events(vec![
            StreamEvent::TextDelta {
                delta: "Hello".to_string(),
            },
            StreamEvent::TextDelta {
                delta: ", world".to_string(),
            },
            StreamEvent::Finish {
                reason: FinishReason::Stop,
                usage: stop_usage(),
            },
        ])],
        ToolRegistry::new(),
        ProcessorConfig::default(),
    );

    let result = h.processor.run("hi").await.unwrap();
    assert_eq!(result.steps, 1);
    assert_eq!(result.final_text, "Hello, world");
    assert_eq!(result.stop_reason, StopReason::Completed);
    assert_eq!(result.usage.input.value(), Some(9));

    let events = drain(&mut h.events);

    // Exactly one step_start before exactly one step_finish, idle last.
    let starts: Vec<usize> = events
        .iter()
        .enumerate()
        .filter_map(|(i, e)| match e {
            EngineEvent::PartUpdated {
                part: Part::StepStart(_),
                ..
            } => Some(i),
            _ => None,
        })
        .collect();
    let finishes = step_finishes(&events);
    assert_eq!(starts.len(), 1);
    assert_eq!(finishes.len(), 1);
    assert_eq!(finishes[0].reason, FinishReason::Stop);
    assert_eq!(finishes[0].tokens.input.value(), Some(9));
    // gpt-4o is in the builtin catalog, so cost is known.
    assert!(finishes[0].cost.value().is_some());
    assert!(matches!(events.last(), Some(EngineEvent::SessionIdle { .. })));
}

#[tokio::test]
async fn test_zero_tools_means_no_tools_field() {
    let mut h = harness(
        vec![Script::Events(vec![StreamEvent::Finish {
            reason: FinishReason::Stop,
            usage: stop_usage(),
        }])],
        ToolRegistry::new(),
        ProcessorConfig::default(),
    );

    h.processor.run("hi").await.unwrap();
    let requests = h.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].tools.is_empty());
}

#[tokio::test]
async fn test_tool_turn_runs_two_steps() {
    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(EchoTool));

    let mut h = harness(
        vec![
            Script::Events(vec![
                StreamEvent::ToolCallStart {
                    call_id: "call_1".to_string(),
                    name: "echo".to_string(),
                },
                StreamEvent::ToolCallDelta {
                    call_id: "call_1".to_string(),
                    arguments_delta: "{\"message\":\"file contents\"}".to_string(),
                },
                StreamEvent::ToolCallEnd {
                    call_id: "call_1".to_string(),
                },
                StreamEvent::Finish {
                    reason: FinishReason::ToolUse,
                    usage: TokenUsage::unknown(),
                },
            ]),
            Script::Events(vec![
                StreamEvent::TextDelta {
                    delta: "done".to_string(),
                },
                StreamEvent::Finish {
                    reason: FinishReason::Stop,
                    usage: stop_usage(),
                },
            ]),
        ],
        tools,
        ProcessorConfig::default(),
    );

    let result = h.processor.run("read the file").await.unwrap();
    assert_eq!(result.steps, 2);
    assert_eq!(result.final_text, "done");
    assert_eq!(result.stop_reason, StopReason::Completed);

    // Tool part walked the machine in order.
    let events = drain(&mut h.events);
    let statuses = tool_statuses(&events);
    assert_eq!(
        statuses,
        vec![ToolStatus::Pending, ToolStatus::Pending, ToolStatus::Running, ToolStatus::Completed]
    );

    // The follow-up request carried the tool result back to the model.
    let requests = h.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    let tool_message = requests[1]
        .messages
        .iter()
        .find(|m| m.role == strand_sdk::Role::Tool)
        .expect("tool result message missing");
    assert!(matches!(
        &tool_message.content[0],
        strand_sdk::ContentBlock::ToolResult { content, is_error: false, .. }
            if content == "file contents"
    ));

    // Both step boundaries are present and ordered.
    let finishes = step_finishes(&events);
    assert_eq!(finishes.len(), 2);
    assert_eq!(finishes[0].reason, FinishReason::ToolUse);
    assert_eq!(finishes[1].reason, FinishReason::Stop);
}

#[tokio::test]
async fn test_failed_tool_ends_turn_and_records_error() {
    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(FailingTool));

    let mut h = harness(
        vec![Script::Events(vec![
            StreamEvent::ToolCallStart {
                call_id: "call_1".to_string(),
                name: "explode".to_string(),
            },
            StreamEvent::ToolCallEnd {
                call_id: "call_1".to_string(),
            },
            StreamEvent::Finish {
                reason: FinishReason::ToolUse,
                usage: TokenUsage::unknown(),
            },
        ])],
        tools,
        ProcessorConfig::default(),
    );

    let result = h.processor.run("go").await.unwrap();
    // No successful tool, so the loop must not continue to another step.
    assert_eq!(result.steps, 1);
    assert_eq!(result.stop_reason, StopReason::Completed);
    assert_eq!(h.requests.lock().unwrap().len(), 1);

    let events = drain(&mut h.events);
    let statuses = tool_statuses(&events);
    assert_eq!(statuses.last(), Some(&ToolStatus::Error));
}

#[tokio::test]
async fn test_unknown_tool_recorded_as_error() {
    let mut h = harness(
        vec![Script::Events(vec![
            StreamEvent::ToolCallStart {
                call_id: "call_1".to_string(),
                name: "no_such_tool".to_string(),
            },
            StreamEvent::ToolCallEnd {
                call_id: "call_1".to_string(),
            },
            StreamEvent::Finish {
                reason: FinishReason::ToolUse,
                usage: TokenUsage::unknown(),
            },
        ])],
        ToolRegistry::new(),
        ProcessorConfig::default(),
    );

    let result = h.processor.run("go").await.unwrap();
    assert_eq!(result.steps, 1);
    let events = drain(&mut h.events);
    assert_eq!(tool_statuses(&events).last(), Some(&ToolStatus::Error));
}

#[tokio::test]
async fn test_parse_warning_becomes_diagnostic_stream_continues() {
    let mut h = harness(
        vec![Script::Events(vec![
            StreamEvent::ParseWarning {
                preview: "{\"choices\":[{\"index\":".to_string(),
            },
            StreamEvent::TextDelta {
                delta: "ok".to_string(),
            },
            StreamEvent::Finish {
                reason: FinishReason::Stop,
                usage: stop_usage(),
            },
        ])],
        ToolRegistry::new(),
        ProcessorConfig::default(),
    );

    let result = h.processor.run("hi").await.unwrap();
    assert_eq!(result.final_text, "ok");
    assert_eq!(result.stop_reason, StopReason::Completed);

    let events = drain(&mut h.events);
    let diagnostics: Vec<&EngineEvent> = events
        .iter()
        .filter(|e| matches!(e, EngineEvent::Diagnostic { .. }))
        .collect();
    assert_eq!(diagnostics.len(), 1);
}

#[tokio::test]
async fn test_cancellation_mid_stream_aborts_tools() {
    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(SleepyTool));

    let mut h = harness(
        vec![Script::EventsThenHang(vec![
            StreamEvent::TextDelta {
                delta: "par".to_string(),
            },
            StreamEvent::ToolCallStart {
                call_id: "call_1".to_string(),
                name: "sleepy".to_string(),
            },
            StreamEvent::ToolCallEnd {
                call_id: "call_1".to_string(),
            },
        ])],
        tools,
        ProcessorConfig::default(),
    );

    let cancel = h.processor.cancel_token().clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(80)).await;
        cancel.cancel();
    });

    let result = h.processor.run("go").await.unwrap();
    assert_eq!(result.stop_reason, StopReason::Interrupted);

    let events = drain(&mut h.events);
    // The running tool ended in `aborted`, a step_finish was still
    // published, and the session went idle.
    assert_eq!(tool_statuses(&events).last(), Some(&ToolStatus::Aborted));
    let finishes = step_finishes(&events);
    assert_eq!(finishes.len(), 1);
    assert_eq!(finishes[0].reason, FinishReason::Error);
    assert!(matches!(events.last(), Some(EngineEvent::SessionIdle { .. })));

    // Nothing is left open in the ledger.
    assert!(h.store.open_tool_parts(&h.session_id).unwrap().is_empty());
}

#[tokio::test]
async fn test_max_steps_guard() {
    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(EchoTool));

    // The model always asks for another tool; the ceiling must stop it.
    let mut scripts = Vec::new();
    for i in 0..10 {
        let call_id = format!("call_{i}");
        scripts.push(Script::Events(vec![
            StreamEvent::ToolCallStart {
                call_id: call_id.clone(),
                name: "echo".to_string(),
            },
            StreamEvent::ToolCallDelta {
                call_id: call_id.clone(),
                arguments_delta: "{\"message\":\"again\"}".to_string(),
            },
            StreamEvent::ToolCallEnd { call_id },
            StreamEvent::Finish {
                reason: FinishReason::ToolUse,
                usage: TokenUsage::unknown(),
            },
        ]));
    }

    let mut h = harness(
        scripts,
        tools,
        ProcessorConfig {
            max_steps: 3,
            max_tokens: None,
        },
    );

    let result = h.processor.run("loop forever").await.unwrap();
    assert_eq!(result.steps, 3);
    assert_eq!(result.stop_reason, StopReason::MaxSteps);
}

#[tokio::test]
async fn test_budget_exhaustion_is_fatal() {
    let client = ApiClient::with_config(ApiClientConfig::default().with_retry(
        RetryConfig::default().with_budget(std::time::Duration::from_millis(100)),
    ));
    let mut h = harness_with_client(
        vec![Script::Fail(|| SdkError::RateLimitExceeded {
            message: "busy".to_string(),
            retry_after: Some(std::time::Duration::from_secs(3600)),
        })],
        ToolRegistry::new(),
        ProcessorConfig::default(),
        client,
    );

    let result = h.processor.run("hi").await.unwrap();
    assert!(result.is_fatal());

    let events = drain(&mut h.events);
    let error = events
        .iter()
        .find_map(|e| match e {
            EngineEvent::SessionError { error, .. } => Some(error.clone()),
            _ => None,
        })
        .expect("session error missing");
    assert!(!error.recoverable);
    assert!(matches!(events.last(), Some(EngineEvent::SessionIdle { .. })));
}

#[tokio::test]
async fn test_stream_error_fails_step_but_not_fatally() {
    let mut h = harness(
        vec![Script::Events(vec![StreamEvent::StreamError {
            code: "internal".to_string(),
            message: "upstream fell over".to_string(),
            retryable: false,
        }])],
        ToolRegistry::new(),
        ProcessorConfig::default(),
    );

    let result = h.processor.run("hi").await.unwrap();
    assert!(result.is_error());
    assert!(!result.is_fatal());

    let events = drain(&mut h.events);
    let finishes = step_finishes(&events);
    assert_eq!(finishes[0].reason, FinishReason::Error);
}

#[tokio::test]
async fn test_stream_error_forces_running_tools_to_error() {
    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(SleepyTool));

    let mut h = harness(
        vec![Script::Events(vec![
            StreamEvent::ToolCallStart {
                call_id: "call_1".to_string(),
                name: "sleepy".to_string(),
            },
            StreamEvent::ToolCallEnd {
                call_id: "call_1".to_string(),
            },
            StreamEvent::StreamError {
                code: "internal".to_string(),
                message: "upstream fell over".to_string(),
                retryable: false,
            },
        ])],
        tools,
        ProcessorConfig::default(),
    );

    let started = std::time::Instant::now();
    let result = h.processor.run("go").await.unwrap();
    assert!(result.is_error());
    assert!(!result.is_fatal());
    // The sleeping tool must not be waited out once the stream has failed.
    assert!(
        started.elapsed() < std::time::Duration::from_secs(5),
        "step stayed blocked on a dispatched tool"
    );

    let events = drain(&mut h.events);
    // The running call was forced to `error`, never `completed`.
    let statuses = tool_statuses(&events);
    assert_eq!(statuses.last(), Some(&ToolStatus::Error));
    assert!(!statuses.contains(&ToolStatus::Completed));
    let finishes = step_finishes(&events);
    assert_eq!(finishes[0].reason, FinishReason::Error);
    assert!(h.store.open_tool_parts(&h.session_id).unwrap().is_empty());
}

#[tokio::test]
async fn test_usage_accumulates_across_steps() {
    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(EchoTool));

    let mut h = harness(
        vec![
            Script::Events(vec![
                StreamEvent::ToolCallStart {
                    call_id: "call_1".to_string(),
                    name: "echo".to_string(),
                },
                StreamEvent::ToolCallDelta {
                    call_id: "call_1".to_string(),
                    arguments_delta: "{\"message\":\"x\"}".to_string(),
                },
                StreamEvent::ToolCallEnd {
                    call_id: "call_1".to_string(),
                },
                StreamEvent::Finish {
                    reason: FinishReason::ToolUse,
                    usage: TokenUsage::new(100, 10),
                },
            ]),
            Script::Events(vec![StreamEvent::Finish {
                reason: FinishReason::Stop,
                usage: TokenUsage::new(50, 5),
            }]),
        ],
        tools,
        ProcessorConfig::default(),
    );

    let result = h.processor.run("hi").await.unwrap();
    assert_eq!(result.usage.input.value(), Some(150));
    assert_eq!(result.usage.output.value(), Some(15));
}

#[tokio::test]
async fn test_fork_ledger_equals_source_at_fork_time() {
    let mut h = harness(
        vec![Script::Events(vec![
            StreamEvent::TextDelta {
                delta: "answer".to_string(),
            },
            StreamEvent::Finish {
                reason: FinishReason::Stop,
                usage: stop_usage(),
            },
        ])],
        ToolRegistry::new(),
        ProcessorConfig::default(),
    );

    h.processor.run("hi").await.unwrap();

    let fork = h.store.fork(&h.session_id).unwrap();
    assert_eq!(
        h.store.ledger(&fork.id).unwrap(),
        h.store.ledger(&h.session_id).unwrap()
    );
    assert_eq!(fork.parent_id.as_deref(), Some(h.session_id.as_str()));
}
