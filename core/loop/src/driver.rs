//! The step loop.
//!
//! One [`SessionProcessor`] drives one turn. Per step it:
//!
//! 1. opens an assistant message with a `step_start` part
//! 2. builds a request from the ledger plus registered tool descriptors
//! 3. obtains a stream through the retry transport
//! 4. folds neutral events into parts (text, reasoning, tool calls)
//! 5. publishes `step_finish` with the mapped finish reason, usage, and cost
//! 6. awaits dispatched tool executions and records their results
//! 7. continues to the next step only on `tool-use` with at least one
//!    successful tool
//!
//! On every exit path - normal, error, cancellation - any tool part still in
//! a non-terminal state is transitioned to `error` or `aborted` through the
//! same validated store interface as normal execution, then `session.idle`
//! is published.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use serde_json::Value;
use strand_api::ApiClient;
use strand_api::ApiError;
use strand_protocol::DiagnosticLevel;
use strand_protocol::EngineError;
use strand_protocol::EngineEvent;
use strand_protocol::FinishReason;
use strand_protocol::Message;
use strand_protocol::ModelCatalog;
use strand_protocol::Part;
use strand_protocol::ReasoningPart;
use strand_protocol::StepFinishPart;
use strand_protocol::StepStartPart;
use strand_protocol::TextPart;
use strand_protocol::TokenUsage;
use strand_protocol::ToolPart;
use strand_protocol::ToolState;
use strand_protocol::ToolStatus;
use strand_protocol::ToolTime;
use strand_protocol::now_ms;
use strand_sdk::GenerateRequest;
use strand_sdk::Model;
use strand_sdk::StreamEvent;
use strand_session::SessionStore;
use strand_tools::PartialUpdate;
use strand_tools::ToolContext;
use strand_tools::ToolError;
use strand_tools::ToolOutput;
use strand_tools::ToolRegistry;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::result::StopReason;
use crate::result::TurnResult;

/// Configuration for the processor.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Ceiling on steps per turn.
    pub max_steps: i32,
    /// Output token ceiling forwarded to the provider.
    pub max_tokens: Option<i64>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_steps: 50,
            max_tokens: None,
        }
    }
}

/// Drives one session's turns.
pub struct SessionProcessor {
    store: Arc<SessionStore>,
    session_id: String,
    model: Arc<dyn Model>,
    api_client: ApiClient,
    tools: Arc<ToolRegistry>,
    catalog: ModelCatalog,
    config: ProcessorConfig,
    cancel: CancellationToken,
    step_number: i32,
}

/// Builder for [`SessionProcessor`].
#[derive(Default)]
pub struct SessionProcessorBuilder {
    store: Option<Arc<SessionStore>>,
    session_id: Option<String>,
    model: Option<Arc<dyn Model>>,
    api_client: Option<ApiClient>,
    tools: Option<Arc<ToolRegistry>>,
    catalog: Option<ModelCatalog>,
    config: ProcessorConfig,
    cancel: Option<CancellationToken>,
}

impl SessionProcessorBuilder {
    /// Create a builder.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(mut self, store: Arc<SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn model(mut self, model: Arc<dyn Model>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn api_client(mut self, client: ApiClient) -> Self {
        self.api_client = Some(client);
        self
    }

    pub fn tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn catalog(mut self, catalog: ModelCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn config(mut self, config: ProcessorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Build the processor.
    ///
    /// # Panics
    /// Panics if `store`, `session_id`, or `model` have not been set.
    #[allow(clippy::expect_used)]
    pub fn build(self) -> SessionProcessor {
        SessionProcessor {
            store: self.store.expect("store is required"),
            session_id: self.session_id.expect("session_id is required"),
            model: self.model.expect("model is required"),
            api_client: self.api_client.unwrap_or_default(),
            tools: self.tools.unwrap_or_else(|| Arc::new(ToolRegistry::new())),
            catalog: self.catalog.unwrap_or_else(ModelCatalog::builtin),
            config: self.config,
            cancel: self.cancel.unwrap_or_default(),
            step_number: 0,
        }
    }
}

/// Outcome of one step.
struct StepOutcome {
    reason: FinishReason,
    any_tool_success: bool,
    cancelled: bool,
}

/// A tool call whose arguments are still streaming.
struct ToolCallBuilder {
    part_id: String,
    name: String,
    fragments: String,
}

type ToolTaskResult = (Value, i64, Result<ToolOutput, ToolError>);

/// A tool call whose execution task has been started.
struct DispatchedTool {
    part_id: String,
    task: JoinHandle<ToolTaskResult>,
}

impl SessionProcessor {
    /// Create a builder.
    pub fn builder() -> SessionProcessorBuilder {
        SessionProcessorBuilder::new()
    }

    /// The cancellation token that aborts this processor's work.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run one turn: from prompt submission to `session.idle`.
    pub async fn run(&mut self, prompt: &str) -> anyhow::Result<TurnResult> {
        info!(session_id = %self.session_id, input_len = prompt.len(), "Running turn");

        let user = Message::user(vec![Part::Text(TextPart {
            id: new_id(),
            text: prompt.to_string(),
            completed: true,
        })]);
        self.store.append_message(&self.session_id, user)?;

        let mut steps = 0;
        let mut final_text = String::new();
        let mut total_usage = TokenUsage::new(0, 0);
        let mut stop = StopReason::Completed;

        loop {
            if self.cancel.is_cancelled() {
                stop = StopReason::Interrupted;
                break;
            }
            if steps >= self.config.max_steps {
                warn!(max_steps = self.config.max_steps, "Step ceiling reached");
                stop = StopReason::MaxSteps;
                break;
            }
            steps += 1;

            match self.run_step(&mut final_text, &mut total_usage).await {
                Ok(outcome) if outcome.cancelled => {
                    stop = StopReason::Interrupted;
                    break;
                }
                Ok(outcome) => {
                    if outcome.reason == FinishReason::ToolUse && outcome.any_tool_success {
                        continue;
                    }
                    stop = StopReason::Completed;
                    break;
                }
                Err(error) => {
                    let fatal = matches!(
                        error.downcast_ref::<ApiError>(),
                        Some(ApiError::BudgetExhausted { .. })
                    );
                    stop = StopReason::Error {
                        message: error.to_string(),
                        fatal,
                    };
                    break;
                }
            }
        }

        // Cleanup invariant: no tool part may be left in a non-terminal
        // state, whatever the exit path was.
        let cancelled = matches!(stop, StopReason::Interrupted);
        self.finalize_open_tool_parts(cancelled);

        if let StopReason::Error { message, fatal } = &stop {
            self.store.bus().publish(EngineEvent::SessionError {
                session_id: self.session_id.clone(),
                error: if *fatal {
                    EngineError::fatal("session_failed", message.clone())
                } else {
                    EngineError::recoverable("step_failed", message.clone())
                },
            });
        }
        self.store.bus().publish(EngineEvent::SessionIdle {
            session_id: self.session_id.clone(),
        });

        Ok(TurnResult {
            steps,
            final_text,
            usage: total_usage,
            stop_reason: stop,
        })
    }

    /// Run a single step.
    async fn run_step(
        &mut self,
        final_text: &mut String,
        total_usage: &mut TokenUsage,
    ) -> anyhow::Result<StepOutcome> {
        self.step_number += 1;
        let step = self.step_number;
        let session = self.store.get(&self.session_id)?;

        let assistant = Message::assistant();
        let message_id = assistant.id.clone();
        self.store.append_message(&self.session_id, assistant)?;
        self.store.append_part(
            &self.session_id,
            &message_id,
            Part::StepStart(StepStartPart { id: new_id(), step }),
        )?;

        let mut request =
            GenerateRequest::new(self.store.ledger(&self.session_id)?.to_request_messages())
                .with_tools(self.tools.definitions());
        if let Some(system) = &session.system_prompt {
            request = request.with_system(system.clone());
        }
        if let Some(max_tokens) = self.config.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        debug!(session_id = %self.session_id, step, "Sending API request");

        let cancel = self.cancel.clone();
        let mut reason = FinishReason::Unknown;
        let mut usage = TokenUsage::unknown();
        let mut cancelled = false;
        let mut failure: Option<anyhow::Error> = None;

        // Partial-update plumbing: tools publish patches keyed by call id;
        // a consumer task folds them into the owning part's running state.
        let (partial_tx, partial_rx) = mpsc::channel::<PartialUpdate>(64);
        let call_to_part: Arc<Mutex<HashMap<String, String>>> = Arc::new(Mutex::new(HashMap::new()));
        let partial_task = self.spawn_partial_consumer(partial_rx, call_to_part.clone());

        let mut text_part_id: Option<String> = None;
        let mut reasoning_part_id: Option<String> = None;
        let mut builders: HashMap<String, ToolCallBuilder> = HashMap::new();
        let mut dispatched: Vec<DispatchedTool> = Vec::new();

        match self
            .api_client
            .stream_request(&*self.model, request, &cancel)
            .await
        {
            Ok(mut stream) => loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        cancelled = true;
                        break;
                    }
                    next = stream.next() => next,
                };

                let Some(event) = next else {
                    // Stream closed without a finish event.
                    break;
                };

                match event {
                    Ok(StreamEvent::TextDelta { delta }) => {
                        final_text.push_str(&delta);
                        let part_id =
                            self.ensure_text_part(&message_id, &mut text_part_id, false)?;
                        self.store.update_part(&self.session_id, &part_id, |part| {
                            if let Part::Text(text) = part {
                                text.text.push_str(&delta);
                            }
                        })?;
                    }
                    Ok(StreamEvent::ReasoningDelta { delta }) => {
                        let part_id =
                            self.ensure_text_part(&message_id, &mut reasoning_part_id, true)?;
                        self.store.update_part(&self.session_id, &part_id, |part| {
                            if let Part::Reasoning(reasoning) = part {
                                reasoning.text.push_str(&delta);
                            }
                        })?;
                    }
                    Ok(StreamEvent::ToolCallStart { call_id, name }) => {
                        self.open_tool_call(&message_id, &mut builders, call_id, name)?;
                    }
                    Ok(StreamEvent::ToolCallDelta {
                        call_id,
                        arguments_delta,
                    }) => {
                        if let Some(builder) = builders.get_mut(&call_id) {
                            builder.fragments.push_str(&arguments_delta);
                            self.store
                                .update_part(&self.session_id, &builder.part_id, |part| {
                                    if let Part::Tool(ToolPart {
                                        state: ToolState::Pending { input_fragments },
                                        ..
                                    }) = part
                                    {
                                        input_fragments.push(arguments_delta.clone());
                                    }
                                })?;
                        }
                    }
                    Ok(StreamEvent::ToolCallEnd { call_id }) => {
                        if let Some(builder) = builders.remove(&call_id) {
                            let tool = self.dispatch_tool(
                                call_id,
                                builder,
                                &call_to_part,
                                &partial_tx,
                            )?;
                            dispatched.push(tool);
                        }
                    }
                    Ok(StreamEvent::Finish {
                        reason: finish,
                        usage: step_usage,
                    }) => {
                        reason = finish;
                        usage = step_usage;
                        break;
                    }
                    Ok(StreamEvent::ParseWarning { preview }) => {
                        self.store.bus().publish(EngineEvent::Diagnostic {
                            session_id: Some(self.session_id.clone()),
                            level: DiagnosticLevel::Warning,
                            message: format!("skipped malformed stream frame: {preview}"),
                        });
                    }
                    Ok(StreamEvent::StreamError {
                        code,
                        message,
                        retryable: _,
                    }) => {
                        reason = FinishReason::Error;
                        failure = Some(anyhow::anyhow!("stream error: {code}: {message}"));
                        break;
                    }
                    Err(error) => {
                        reason = FinishReason::Error;
                        failure = Some(error.into());
                        break;
                    }
                }
            },
            Err(ApiError::Interrupted) => {
                cancelled = true;
            }
            Err(error) => {
                reason = FinishReason::Error;
                failure = Some(error.into());
            }
        }

        // Freeze streamed prose.
        for part_id in [text_part_id, reasoning_part_id].into_iter().flatten() {
            let _ = self.store.update_part(&self.session_id, &part_id, |part| match part {
                Part::Text(text) => text.completed = true,
                Part::Reasoning(reasoning) => reasoning.completed = true,
                _ => {}
            });
        }

        if cancelled {
            reason = FinishReason::Error;
        }

        let cost = self.catalog.info(&session.model).compute_cost(&usage);
        self.store.append_part(
            &self.session_id,
            &message_id,
            Part::StepFinish(StepFinishPart {
                id: new_id(),
                step,
                reason,
                tokens: usage,
                cost,
            }),
        )?;
        accumulate_usage(total_usage, &usage);

        // A stream-level failure forces still-running calls straight to the
        // `error` terminal state; their real outcomes no longer matter and
        // must not keep the step alive. Otherwise, await the dispatched
        // tools and record what they actually returned.
        let any_tool_success = if failure.is_some() {
            self.fail_dispatched_tools(dispatched);
            false
        } else {
            self.await_tools(dispatched).await
        };

        drop(partial_tx);
        let _ = partial_task.await;

        if let Some(error) = failure {
            return Err(error);
        }

        Ok(StepOutcome {
            reason,
            any_tool_success,
            cancelled,
        })
    }

    /// Create the step's text (or reasoning) part on first delta.
    fn ensure_text_part(
        &self,
        message_id: &str,
        slot: &mut Option<String>,
        reasoning: bool,
    ) -> anyhow::Result<String> {
        if let Some(id) = slot {
            return Ok(id.clone());
        }
        let id = new_id();
        let part = if reasoning {
            Part::Reasoning(ReasoningPart {
                id: id.clone(),
                text: String::new(),
                completed: false,
            })
        } else {
            Part::Text(TextPart {
                id: id.clone(),
                text: String::new(),
                completed: false,
            })
        };
        self.store.append_part(&self.session_id, message_id, part)?;
        *slot = Some(id.clone());
        Ok(id)
    }

    /// Record a newly opened tool call as a pending part.
    fn open_tool_call(
        &self,
        message_id: &str,
        builders: &mut HashMap<String, ToolCallBuilder>,
        call_id: String,
        name: String,
    ) -> anyhow::Result<()> {
        let part_id = new_id();
        let part = Part::Tool(ToolPart {
            id: part_id.clone(),
            call_id: call_id.clone(),
            tool: name.clone(),
            state: ToolState::pending(),
        });
        match self.store.append_part(&self.session_id, message_id, part) {
            Ok(()) => {
                builders.insert(call_id, ToolCallBuilder {
                    part_id,
                    name,
                    fragments: String::new(),
                });
                Ok(())
            }
            Err(strand_session::StoreError::DuplicateCallId(id)) => {
                // A provider replaying call ids is a protocol violation;
                // surface it and drop the call rather than corrupt the ledger.
                self.store.bus().publish(EngineEvent::Diagnostic {
                    session_id: Some(self.session_id.clone()),
                    level: DiagnosticLevel::Warning,
                    message: format!("provider reused tool call id {id}; call dropped"),
                });
                Ok(())
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Transition a completed call to running and start its execution task.
    fn dispatch_tool(
        &self,
        call_id: String,
        builder: ToolCallBuilder,
        call_to_part: &Arc<Mutex<HashMap<String, String>>>,
        partial_tx: &mpsc::Sender<PartialUpdate>,
    ) -> anyhow::Result<DispatchedTool> {
        let input = parse_arguments(&builder.fragments);
        let started = now_ms();

        self.store.transition_tool(
            &self.session_id,
            &builder.part_id,
            ToolState::Running {
                input: input.clone(),
                partial: Value::Null,
                time: ToolTime::started_at(started),
            },
        )?;

        #[allow(clippy::expect_used)]
        call_to_part
            .lock()
            .expect("call map lock should not be poisoned")
            .insert(call_id.clone(), builder.part_id.clone());

        let tool = self.tools.get(&builder.name);
        let name = builder.name;
        let part_id = builder.part_id;
        let ctx = ToolContext::new(self.session_id.clone(), call_id)
            .with_cancel_token(self.cancel.child_token())
            .with_partial_channel(partial_tx.clone());

        let task = tokio::spawn(async move {
            let result = match tool {
                None => Err(ToolError::execution_failed(format!("unknown tool: {name}"))),
                Some(tool) => match tool.validate(&input) {
                    Err(error) => Err(error),
                    Ok(()) => {
                        tokio::select! {
                            biased;
                            _ = ctx.cancelled() => Err(ToolError::Aborted),
                            result = tool.execute(input.clone(), &ctx) => result,
                        }
                    }
                },
            };
            (input, started, result)
        });

        Ok(DispatchedTool { part_id, task })
    }

    /// Await every dispatched tool and record terminal states.
    ///
    /// Returns whether at least one tool completed successfully.
    async fn await_tools(&self, dispatched: Vec<DispatchedTool>) -> bool {
        let mut any_success = false;
        for tool in dispatched {
            let (input, started, result) = match tool.task.await {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    warn!(error = %join_error, "Tool task panicked");
                    continue;
                }
            };
            let time = ToolTime::started_at(started).ended_at(now_ms());
            let state = match result {
                Ok(output) => {
                    any_success = true;
                    ToolState::Completed {
                        input,
                        output: output.output,
                        title: output.title,
                        metadata: output.metadata,
                        time,
                    }
                }
                Err(ToolError::Aborted) => ToolState::Aborted { input, time },
                Err(error) => ToolState::Error {
                    input,
                    message: error.to_string(),
                    time,
                },
            };
            if let Err(error) =
                self.store
                    .transition_tool(&self.session_id, &tool.part_id, state)
            {
                warn!(part_id = %tool.part_id, error = %error, "Failed to record tool result");
            }
        }
        any_success
    }

    /// Force still-running calls to `error` after a stream-level failure.
    ///
    /// The execution tasks are aborted rather than awaited; whatever they
    /// would have returned is irrelevant once the step has failed.
    fn fail_dispatched_tools(&self, dispatched: Vec<DispatchedTool>) {
        for tool in dispatched {
            tool.task.abort();
            let ended = now_ms();
            let result = self.store.update_part(&self.session_id, &tool.part_id, |part| {
                if let Part::Tool(tool_part) = part {
                    if tool_part.state.status() == ToolStatus::Running {
                        let input = tool_part
                            .state
                            .input()
                            .cloned()
                            .unwrap_or(Value::Null);
                        let start = tool_part.state.time().map(|t| t.start).unwrap_or(ended);
                        tool_part.state = ToolState::Error {
                            input,
                            message: "stream failed before the tool finished".to_string(),
                            time: ToolTime::started_at(start).ended_at(ended),
                        };
                    }
                }
            });
            if let Err(error) = result {
                warn!(part_id = %tool.part_id, error = %error, "Failed to fail tool after stream error");
            }
        }
    }

    /// Fold tool partial updates into the owning part's running state.
    fn spawn_partial_consumer(
        &self,
        mut rx: mpsc::Receiver<PartialUpdate>,
        call_to_part: Arc<Mutex<HashMap<String, String>>>,
    ) -> JoinHandle<()> {
        let store = self.store.clone();
        let session_id = self.session_id.clone();
        tokio::spawn(async move {
            while let Some(update) = rx.recv().await {
                #[allow(clippy::expect_used)]
                let part_id = call_to_part
                    .lock()
                    .expect("call map lock should not be poisoned")
                    .get(&update.call_id)
                    .cloned();
                let Some(part_id) = part_id else { continue };
                let _ = store.update_part(&session_id, &part_id, |part| {
                    if let Part::Tool(ToolPart {
                        state: ToolState::Running { partial, .. },
                        ..
                    }) = part
                    {
                        *partial = update.patch.clone();
                    }
                });
            }
        })
    }

    /// The cleanup invariant: transition every open tool part to `aborted`
    /// (when cancelled) or `error`, through the validated store interface.
    fn finalize_open_tool_parts(&self, cancelled: bool) {
        let Ok(open) = self.store.open_tool_parts(&self.session_id) else {
            return;
        };
        for part_id in open {
            let result = self.store.update_part(&self.session_id, &part_id, |part| {
                if let Part::Tool(tool) = part {
                    let input = tool
                        .state
                        .input()
                        .cloned()
                        .unwrap_or(Value::Null);
                    let start = tool.state.time().map(|t| t.start).unwrap_or_else(now_ms);
                    let time = ToolTime::started_at(start).ended_at(now_ms());
                    tool.state = if cancelled {
                        ToolState::Aborted { input, time }
                    } else {
                        ToolState::Error {
                            input,
                            message: "step ended before the tool finished".to_string(),
                            time,
                        }
                    };
                }
            });
            if let Err(error) = result {
                warn!(part_id = %part_id, error = %error, "Cleanup transition failed");
            }
        }
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Parse streamed argument fragments into a value.
///
/// Empty arguments mean "no arguments"; unparseable arguments become `null`
/// so the failure is visible downstream instead of crashing the step.
fn parse_arguments(fragments: &str) -> Value {
    if fragments.trim().is_empty() {
        return serde_json::json!({});
    }
    match serde_json::from_str(fragments) {
        Ok(value) => value,
        Err(error) => {
            warn!(error = %error, "Tool arguments failed to parse");
            Value::Null
        }
    }
}

fn accumulate_usage(total: &mut TokenUsage, step: &TokenUsage) {
    total.input = total.input.saturating_add(step.input);
    total.output = total.output.saturating_add(step.output);
    total.reasoning = total.reasoning.saturating_add(step.reasoning);
    total.cache.read = total.cache.read.saturating_add(step.cache.read);
    total.cache.write = total.cache.write.saturating_add(step.cache.write);
}

#[cfg(test)]
#[path = "driver.test.rs"]
mod tests;
