//! OpenAI-compatible chat-completions adapter.
//!
//! Speaks the `/chat/completions` SSE dialect used by OpenAI and the long
//! tail of gateways that imitate it. Outbound, the neutral request becomes a
//! chat-completions body; inbound, each SSE frame becomes zero or more
//! neutral [`StreamEvent`]s.
//!
//! # Usage extraction
//!
//! Some gateways leave the standard `usage` fields empty and tuck usage under
//! a provider-metadata envelope. Extraction checks `usage` first and falls
//! back, field by field, to `provider_metadata.<provider>.usage`
//! (`providerMetadata` accepted). Values the wire never supplies stay
//! [`TokenCount::Unknown`]; zero is never substituted.
//!
//! # Corruption handling
//!
//! A frame that fails JSON decoding becomes a [`StreamEvent::ParseWarning`]
//! carrying a bounded preview of the payload; the stream continues with the
//! next frame.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;

use async_trait::async_trait;
use futures::stream::Stream;
use serde_json::Value;
use serde_json::json;
use strand_protocol::FinishReason;
use strand_protocol::TokenCount;
use strand_protocol::TokenUsage;
use tracing::warn;

use crate::credentials::CredentialResolver;
use crate::error::Result;
use crate::error::SdkError;
use crate::messages::ContentBlock;
use crate::messages::Role;
use crate::provider::EventStream;
use crate::provider::Model;
use crate::provider::Provider;
use crate::rate_limits::RateLimitSnapshot;
use crate::request::GenerateRequest;
use crate::response::StreamEvent;
use crate::sse::SseFrame;
use crate::sse::SseFrameStream;
use crate::sse::preview;

/// Configuration for an OpenAI-compatible provider.
#[derive(Debug, Clone)]
pub struct OpenAiCompatConfig {
    /// Registry key (also the metadata-envelope key for usage fallback).
    pub provider_id: String,
    /// Default API base URL; a credential's base_url override wins.
    pub base_url: String,
}

impl OpenAiCompatConfig {
    /// Config for the hosted OpenAI API.
    pub fn openai() -> Self {
        Self {
            provider_id: "openai".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }

    /// Config for an arbitrary compatible gateway.
    pub fn new(provider_id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            base_url: base_url.into(),
        }
    }
}

/// Provider speaking the chat-completions dialect.
pub struct OpenAiCompatProvider {
    config: OpenAiCompatConfig,
    http: reqwest::Client,
    credentials: Arc<dyn CredentialResolver>,
}

/// Connect timeout for outbound requests, in milliseconds.
const CONNECT_TIMEOUT_MS: u64 = 300_000;

impl OpenAiCompatProvider {
    /// Create a provider with a shared HTTP client.
    pub fn new(config: OpenAiCompatConfig, credentials: Arc<dyn CredentialResolver>) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_millis(CONNECT_TIMEOUT_MS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            config,
            http,
            credentials,
        }
    }

    /// Create a provider reusing an existing HTTP client.
    pub fn with_client(
        config: OpenAiCompatConfig,
        http: reqwest::Client,
        credentials: Arc<dyn CredentialResolver>,
    ) -> Self {
        Self {
            config,
            http,
            credentials,
        }
    }
}

impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.config.provider_id
    }

    fn model(&self, model_id: &str) -> Result<Arc<dyn Model>> {
        if model_id.is_empty() {
            return Err(SdkError::ModelNotFound(String::new()));
        }
        Ok(Arc::new(OpenAiCompatModel {
            config: self.config.clone(),
            model_id: model_id.to_string(),
            http: self.http.clone(),
            credentials: self.credentials.clone(),
        }))
    }
}

/// A model handle bound to one OpenAI-compatible endpoint.
pub struct OpenAiCompatModel {
    config: OpenAiCompatConfig,
    model_id: String,
    http: reqwest::Client,
    credentials: Arc<dyn CredentialResolver>,
}

#[async_trait]
impl Model for OpenAiCompatModel {
    fn provider_id(&self) -> &str {
        &self.config.provider_id
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn stream(&self, request: GenerateRequest) -> Result<EventStream> {
        let credential = self
            .credentials
            .for_provider(&self.config.provider_id)
            .await?;
        let base = credential
            .base_url
            .clone()
            .unwrap_or_else(|| self.config.base_url.clone());
        let url = format!("{}/chat/completions", base.trim_end_matches('/'));

        let body = encode_request(&self.model_id, &request);
        let http_request = credential.apply(self.http.post(&url).json(&body));

        let response = http_request.send().await.map_err(SdkError::from)?;
        let status = response.status();
        if !status.is_success() {
            return Err(classify_http_error(status, response).await);
        }

        let frames = SseFrameStream::new(response.bytes_stream());
        Ok(Box::pin(ChunkTranslator::new(
            self.config.provider_id.clone(),
            frames,
        )))
    }
}

/// Translate the neutral request into a chat-completions body.
pub(crate) fn encode_request(model_id: &str, request: &GenerateRequest) -> Value {
    let mut messages = Vec::new();

    if let Some(system) = &request.system {
        messages.push(json!({ "role": "system", "content": system }));
    }

    for message in &request.messages {
        match message.role {
            Role::System => {
                messages.push(json!({ "role": "system", "content": message.text() }));
            }
            Role::User => {
                messages.push(json!({ "role": "user", "content": message.text() }));
            }
            Role::Assistant => {
                let text = message.text();
                let tool_calls: Vec<Value> = message
                    .content
                    .iter()
                    .filter_map(|block| match block {
                        ContentBlock::ToolUse { id, name, input } => Some(json!({
                            "id": id,
                            "type": "function",
                            "function": {
                                "name": name,
                                "arguments": input.to_string(),
                            },
                        })),
                        _ => None,
                    })
                    .collect();

                let mut entry = json!({ "role": "assistant" });
                entry["content"] = if text.is_empty() {
                    Value::Null
                } else {
                    Value::String(text)
                };
                if !tool_calls.is_empty() {
                    entry["tool_calls"] = Value::Array(tool_calls);
                }
                messages.push(entry);
            }
            Role::Tool => {
                // One wire message per tool result.
                for block in &message.content {
                    if let ContentBlock::ToolResult {
                        call_id,
                        content,
                        is_error: _,
                    } = block
                    {
                        messages.push(json!({
                            "role": "tool",
                            "tool_call_id": call_id,
                            "content": content,
                        }));
                    }
                }
            }
        }
    }

    let mut body = json!({
        "model": model_id,
        "messages": messages,
        "stream": true,
        "stream_options": { "include_usage": true },
    });

    if !request.tools.is_empty() {
        body["tools"] = Value::Array(
            request
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.input_schema,
                        },
                    })
                })
                .collect(),
        );
    }
    if let Some(max_tokens) = request.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    if let Some(temperature) = request.temperature {
        body["temperature"] = json!(temperature);
    }

    body
}

/// Classify a non-2xx response into the error taxonomy.
async fn classify_http_error(status: reqwest::StatusCode, response: reqwest::Response) -> SdkError {
    let retry_after = RateLimitSnapshot::from_headers(response.headers())
        .and_then(|snapshot| snapshot.retry_after);
    let body = response.text().await.unwrap_or_default();
    let (code, message) = parse_error_body(&body);

    match status.as_u16() {
        401 => SdkError::AuthenticationFailed(message),
        403 => SdkError::PermissionDenied {
            message,
            hint: "re-authorize the credential with model access scopes".to_string(),
        },
        404 => SdkError::ModelNotFound(message),
        400 | 422 => SdkError::InvalidRequest(message),
        429 => SdkError::RateLimitExceeded {
            message,
            retry_after,
        },
        _ => SdkError::ProviderError {
            code,
            message,
            status: Some(status.as_u16()),
        },
    }
}

fn parse_error_body(body: &str) -> (String, String) {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        let error = &value["error"];
        let code = error["code"]
            .as_str()
            .or_else(|| error["type"].as_str())
            .unwrap_or("unknown")
            .to_string();
        let message = error["message"].as_str().unwrap_or(body).to_string();
        return (code, message);
    }
    ("unknown".to_string(), body.to_string())
}

/// Map a wire finish reason onto the neutral set.
///
/// Unrecognized values are recorded verbatim in a diagnostic and reported as
/// `Unknown`, never silently coerced to `stop`.
fn map_finish_reason(wire: &str, provider_id: &str) -> FinishReason {
    match wire {
        "stop" => FinishReason::Stop,
        "length" | "max_tokens" => FinishReason::Length,
        "tool_calls" | "function_call" => FinishReason::ToolUse,
        "error" => FinishReason::Error,
        other => {
            warn!(
                provider = %provider_id,
                finish_reason = %other,
                "Unrecognized finish reason from provider"
            );
            FinishReason::Unknown
        }
    }
}

/// Extract usage from a chunk, with the metadata-envelope fallback.
pub(crate) fn extract_usage(chunk: &Value, provider_id: &str) -> TokenUsage {
    let standard = usage_from_object(&chunk["usage"]);

    if standard.is_complete() {
        return standard;
    }

    let envelope = ["provider_metadata", "providerMetadata"]
        .iter()
        .map(|key| &chunk[*key][provider_id]["usage"])
        .find(|candidate| !candidate.is_null())
        .map(usage_from_object)
        .unwrap_or_default();

    standard.or(envelope)
}

fn usage_from_object(usage: &Value) -> TokenUsage {
    let field = |names: &[&str]| -> TokenCount {
        for name in names {
            if let Some(v) = usage[*name].as_i64() {
                return TokenCount::from_option(Some(v));
            }
        }
        TokenCount::Unknown
    };

    TokenUsage {
        input: field(&["prompt_tokens", "promptTokens", "input_tokens", "inputTokens"]),
        output: field(&[
            "completion_tokens",
            "completionTokens",
            "output_tokens",
            "outputTokens",
        ]),
        reasoning: usage["completion_tokens_details"]["reasoning_tokens"]
            .as_i64()
            .or_else(|| usage["reasoningTokens"].as_i64())
            .map(TokenCount::from)
            .unwrap_or(TokenCount::Unknown),
        cache: strand_protocol::usage::CacheUsage {
            read: usage["prompt_tokens_details"]["cached_tokens"]
                .as_i64()
                .or_else(|| usage["cacheReadTokens"].as_i64())
                .map(TokenCount::from)
                .unwrap_or(TokenCount::Unknown),
            write: usage["cacheWriteTokens"]
                .as_i64()
                .map(TokenCount::from)
                .unwrap_or(TokenCount::Unknown),
        },
    }
}

/// SSE frames to neutral events.
struct ChunkTranslator {
    provider_id: String,
    inner: SseFrameStream,
    pending: VecDeque<StreamEvent>,
    /// Wire call ids by tool-call index.
    open_calls: Vec<(i64, String)>,
    finish_reason: Option<FinishReason>,
    usage: TokenUsage,
    finish_emitted: bool,
    source_exhausted: bool,
}

impl ChunkTranslator {
    fn new(provider_id: String, inner: SseFrameStream) -> Self {
        Self {
            provider_id,
            inner,
            pending: VecDeque::new(),
            open_calls: Vec::new(),
            finish_reason: None,
            usage: TokenUsage::unknown(),
            finish_emitted: false,
            source_exhausted: false,
        }
    }

    fn translate(&mut self, frame: &SseFrame) {
        if !frame.has_data() {
            return;
        }
        if frame.is_done() {
            self.finalize();
            return;
        }

        let chunk: Value = match serde_json::from_str(&frame.data) {
            Ok(value) => value,
            Err(error) => {
                let preview = preview(&frame.data);
                warn!(
                    provider = %self.provider_id,
                    error = %error,
                    payload = %preview,
                    "Skipping malformed stream frame"
                );
                self.pending.push_back(StreamEvent::ParseWarning { preview });
                return;
            }
        };

        if !chunk["error"].is_null() {
            let (code, message) = parse_error_body(&frame.data);
            let retryable = matches!(code.as_str(), "overloaded" | "rate_limit_exceeded")
                || chunk["error"]["status"].as_i64().is_some_and(|s| s >= 500);
            self.pending.push_back(StreamEvent::StreamError {
                code,
                message,
                retryable,
            });
            return;
        }

        let usage = extract_usage(&chunk, &self.provider_id);
        self.usage = usage.or(self.usage);

        let Some(choice) = chunk["choices"].get(0) else {
            return;
        };

        let delta = &choice["delta"];
        if let Some(text) = delta["content"].as_str() {
            if !text.is_empty() {
                self.pending.push_back(StreamEvent::TextDelta {
                    delta: text.to_string(),
                });
            }
        }
        if let Some(reasoning) = delta["reasoning_content"]
            .as_str()
            .or_else(|| delta["reasoning"].as_str())
        {
            if !reasoning.is_empty() {
                self.pending.push_back(StreamEvent::ReasoningDelta {
                    delta: reasoning.to_string(),
                });
            }
        }

        if let Some(tool_calls) = delta["tool_calls"].as_array() {
            for call in tool_calls {
                self.translate_tool_call(call);
            }
        }

        if let Some(reason) = choice["finish_reason"].as_str() {
            let mapped = map_finish_reason(reason, &self.provider_id);
            if mapped == FinishReason::ToolUse {
                for (_, call_id) in std::mem::take(&mut self.open_calls) {
                    self.pending.push_back(StreamEvent::ToolCallEnd { call_id });
                }
            }
            self.finish_reason = Some(mapped);
        }
    }

    fn translate_tool_call(&mut self, call: &Value) {
        let index = call["index"].as_i64().unwrap_or(0);

        if let Some(name) = call["function"]["name"].as_str() {
            let call_id = call["id"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| format!("call_{index}"));
            self.open_calls.push((index, call_id.clone()));
            self.pending.push_back(StreamEvent::ToolCallStart {
                call_id,
                name: name.to_string(),
            });
        }

        if let Some(arguments) = call["function"]["arguments"].as_str() {
            if !arguments.is_empty() {
                let call_id = self
                    .open_calls
                    .iter()
                    .rev()
                    .find(|(i, _)| *i == index)
                    .map(|(_, id)| id.clone());
                match call_id {
                    Some(call_id) => {
                        self.pending.push_back(StreamEvent::ToolCallDelta {
                            call_id,
                            arguments_delta: arguments.to_string(),
                        });
                    }
                    None => {
                        warn!(
                            provider = %self.provider_id,
                            index,
                            "Dropping tool-call arguments for unopened call"
                        );
                    }
                }
            }
        }
    }

    /// Emit the terminal `Finish` event exactly once.
    fn finalize(&mut self) {
        if self.finish_emitted {
            return;
        }
        self.finish_emitted = true;

        // A step ended by an abrupt close with no finish_reason is Unknown.
        let reason = self.finish_reason.unwrap_or(FinishReason::Unknown);
        self.pending.push_back(StreamEvent::Finish {
            reason,
            usage: self.usage,
        });
    }
}

impl Stream for ChunkTranslator {
    type Item = Result<StreamEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }
            if self.source_exhausted {
                return Poll::Ready(None);
            }
            if self.finish_emitted {
                // Drain the source without translating trailing frames.
                match Pin::new(&mut self.inner).poll_next(cx) {
                    Poll::Ready(Some(_)) => continue,
                    Poll::Ready(None) => {
                        self.source_exhausted = true;
                        continue;
                    }
                    Poll::Pending => return Poll::Pending,
                }
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(frame))) => {
                    self.translate(&frame);
                }
                Poll::Ready(Some(Err(error))) => {
                    return Poll::Ready(Some(Err(error)));
                }
                Poll::Ready(None) => {
                    // Connection closed without [DONE]; still terminate the
                    // step with what was accumulated.
                    self.finalize();
                    self.source_exhausted = true;
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
#[path = "openai_compat.test.rs"]
mod tests;
