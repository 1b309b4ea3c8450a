use super::*;
use crate::credentials::StaticKeyResolver;
use crate::credentials::ProviderCredential;
use crate::messages::Message;
use crate::messages::ToolDefinition;
use futures::StreamExt;
use pretty_assertions::assert_eq;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::method;
use wiremock::matchers::path;

fn translator_for(body: &'static str) -> ChunkTranslator {
    let byte_stream =
        futures::stream::once(async move { Ok(bytes::Bytes::from_static(body.as_bytes())) });
    ChunkTranslator::new("openai".to_string(), SseFrameStream::new(byte_stream))
}

async fn collect_events(body: &'static str) -> Vec<StreamEvent> {
    let mut translator = translator_for(body);
    let mut events = Vec::new();
    while let Some(event) = translator.next().await {
        events.push(event.unwrap());
    }
    events
}

// ============================================================================
// Request encoding
// ============================================================================

#[test]
fn test_encode_basic_request() {
    let request = GenerateRequest::new(vec![Message::user("hi")]).with_system("be brief");
    let body = encode_request("gpt-4o", &request);

    assert_eq!(body["model"], "gpt-4o");
    assert_eq!(body["stream"], true);
    assert_eq!(body["stream_options"]["include_usage"], true);
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][0]["content"], "be brief");
    assert_eq!(body["messages"][1]["role"], "user");
    assert_eq!(body["messages"][1]["content"], "hi");
    assert!(body.get("tools").is_none());
}

#[test]
fn test_encode_tool_roundtrip_messages() {
    let request = GenerateRequest::new(vec![
        Message::user("read the file"),
        Message::assistant(vec![ContentBlock::tool_use(
            "call_1",
            "read",
            serde_json::json!({"file_path": "/tmp/x"}),
        )]),
        Message::tool_results(vec![ContentBlock::tool_result("call_1", "contents", false)]),
    ]);
    let body = encode_request("gpt-4o", &request);

    let assistant = &body["messages"][1];
    assert_eq!(assistant["role"], "assistant");
    assert_eq!(assistant["content"], serde_json::Value::Null);
    assert_eq!(assistant["tool_calls"][0]["id"], "call_1");
    assert_eq!(assistant["tool_calls"][0]["function"]["name"], "read");

    let tool = &body["messages"][2];
    assert_eq!(tool["role"], "tool");
    assert_eq!(tool["tool_call_id"], "call_1");
    assert_eq!(tool["content"], "contents");
}

#[test]
fn test_encode_tools_and_sampling() {
    let request = GenerateRequest::new(vec![Message::user("hi")])
        .with_tools(vec![ToolDefinition::new(
            "read",
            "Read a file",
            serde_json::json!({"type": "object"}),
        )])
        .with_max_tokens(128)
        .with_temperature(0.5);
    let body = encode_request("gpt-4o", &request);

    assert_eq!(body["tools"][0]["function"]["name"], "read");
    assert_eq!(body["max_tokens"], 128);
    assert_eq!(body["temperature"], 0.5);
}

// ============================================================================
// Chunk translation
// ============================================================================

#[tokio::test]
async fn test_text_stream() {
    let events = collect_events(
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n\
         data: {\"choices\":[{\"delta\":{\"content\":\"lo\"},\"finish_reason\":\"stop\"}]}\n\n\
         data: {\"choices\":[],\"usage\":{\"prompt_tokens\":9,\"completion_tokens\":2}}\n\n\
         data: [DONE]\n\n",
    )
    .await;

    assert_eq!(
        events,
        vec![
            StreamEvent::TextDelta { delta: "Hel".to_string() },
            StreamEvent::TextDelta { delta: "lo".to_string() },
            StreamEvent::Finish {
                reason: FinishReason::Stop,
                usage: TokenUsage::new(9, 2),
            },
        ]
    );
}

#[tokio::test]
async fn test_malformed_frame_skipped_then_stream_continues() {
    // A truncated JSON frame must produce one warning and not kill the rest.
    let events = collect_events(
        "data: {\"choices\":[{\"index\":\n\n\
         data: {\"choices\":[{\"delta\":{\"content\":\"ok\"},\"finish_reason\":\"stop\"}]}\n\n\
         data: [DONE]\n\n",
    )
    .await;

    assert_eq!(events.len(), 3);
    assert!(matches!(&events[0], StreamEvent::ParseWarning { preview } if preview.starts_with("{\"choices\"")));
    assert_eq!(
        events[1],
        StreamEvent::TextDelta { delta: "ok".to_string() }
    );
    assert!(matches!(events[2], StreamEvent::Finish { reason: FinishReason::Stop, .. }));
}

#[tokio::test]
async fn test_tool_call_streaming() {
    let events = collect_events(
        "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_9\",\"function\":{\"name\":\"read\",\"arguments\":\"\"}}]}}]}\n\n\
         data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"{\\\"file_path\\\":\"}}]}}]}\n\n\
         data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"\\\"/tmp/x\\\"}\"}}]}}]}\n\n\
         data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n\n\
         data: [DONE]\n\n",
    )
    .await;

    assert_eq!(
        events,
        vec![
            StreamEvent::ToolCallStart {
                call_id: "call_9".to_string(),
                name: "read".to_string(),
            },
            StreamEvent::ToolCallDelta {
                call_id: "call_9".to_string(),
                arguments_delta: "{\"file_path\":".to_string(),
            },
            StreamEvent::ToolCallDelta {
                call_id: "call_9".to_string(),
                arguments_delta: "\"/tmp/x\"}".to_string(),
            },
            StreamEvent::ToolCallEnd {
                call_id: "call_9".to_string(),
            },
            StreamEvent::Finish {
                reason: FinishReason::ToolUse,
                usage: TokenUsage::unknown(),
            },
        ]
    );
}

#[tokio::test]
async fn test_usage_from_metadata_envelope() {
    // Standard usage fields absent; the gateway reports usage only under the
    // provider-metadata envelope.
    let events = collect_events(
        "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"},\"finish_reason\":\"stop\"}],\
         \"provider_metadata\":{\"openai\":{\"usage\":{\"promptTokens\":120,\"completionTokens\":8}}}}\n\n\
         data: [DONE]\n\n",
    )
    .await;

    let StreamEvent::Finish { usage, .. } = &events[1] else {
        panic!("expected finish, got {:?}", events[1]);
    };
    assert_eq!(usage.input, TokenCount::Known(120));
    assert_eq!(usage.output, TokenCount::Known(8));
}

#[tokio::test]
async fn test_missing_usage_stays_unknown_not_zero() {
    let events = collect_events(
        "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"},\"finish_reason\":\"stop\"}]}\n\n\
         data: [DONE]\n\n",
    )
    .await;

    let StreamEvent::Finish { usage, .. } = &events[1] else {
        panic!("expected finish");
    };
    assert_eq!(usage.input, TokenCount::Unknown);
    assert_eq!(usage.output, TokenCount::Unknown);
}

#[tokio::test]
async fn test_unrecognized_finish_reason_maps_to_unknown() {
    let events = collect_events(
        "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"content_moderation_v2\"}]}\n\n\
         data: [DONE]\n\n",
    )
    .await;

    assert!(matches!(
        events[0],
        StreamEvent::Finish { reason: FinishReason::Unknown, .. }
    ));
}

#[tokio::test]
async fn test_connection_close_without_done_still_finishes() {
    let events = collect_events(
        "data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n\n",
    )
    .await;

    assert_eq!(events.len(), 2);
    assert!(matches!(
        events[1],
        StreamEvent::Finish { reason: FinishReason::Unknown, .. }
    ));
}

#[tokio::test]
async fn test_error_chunk_surfaces_stream_error() {
    let events = collect_events(
        "data: {\"error\":{\"code\":\"overloaded\",\"message\":\"try later\"}}\n\n\
         data: [DONE]\n\n",
    )
    .await;

    assert!(matches!(
        &events[0],
        StreamEvent::StreamError { code, retryable: true, .. } if code == "overloaded"
    ));
}

#[tokio::test]
async fn test_reasoning_delta() {
    let events = collect_events(
        "data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"thinking...\"}}]}\n\n\
         data: [DONE]\n\n",
    )
    .await;
    assert_eq!(
        events[0],
        StreamEvent::ReasoningDelta { delta: "thinking...".to_string() }
    );
}

// ============================================================================
// usage extraction
// ============================================================================

#[test]
fn test_extract_usage_prefers_standard_fields() {
    let chunk = serde_json::json!({
        "usage": { "prompt_tokens": 10, "completion_tokens": 3 },
        "provider_metadata": { "openai": { "usage": { "promptTokens": 999 } } },
    });
    let usage = extract_usage(&chunk, "openai");
    assert_eq!(usage.input, TokenCount::Known(10));
    assert_eq!(usage.output, TokenCount::Known(3));
}

#[test]
fn test_extract_usage_field_level_fallback() {
    // Standard usage is partially present; only the missing field falls back.
    let chunk = serde_json::json!({
        "usage": { "prompt_tokens": 10 },
        "provider_metadata": { "openai": { "usage": { "promptTokens": 999, "completionTokens": 7 } } },
    });
    let usage = extract_usage(&chunk, "openai");
    assert_eq!(usage.input, TokenCount::Known(10));
    assert_eq!(usage.output, TokenCount::Known(7));
}

#[test]
fn test_extract_usage_reasoning_and_cache_details() {
    let chunk = serde_json::json!({
        "usage": {
            "prompt_tokens": 100,
            "completion_tokens": 20,
            "completion_tokens_details": { "reasoning_tokens": 12 },
            "prompt_tokens_details": { "cached_tokens": 64 },
        },
    });
    let usage = extract_usage(&chunk, "openai");
    assert_eq!(usage.reasoning, TokenCount::Known(12));
    assert_eq!(usage.cache.read, TokenCount::Known(64));
    assert_eq!(usage.cache.write, TokenCount::Unknown);
}

// ============================================================================
// HTTP surface
// ============================================================================

fn provider_for(server_url: &str) -> OpenAiCompatProvider {
    let credentials = Arc::new(
        StaticKeyResolver::new().with("openai", ProviderCredential::bearer("sk-test")),
    );
    OpenAiCompatProvider::new(
        OpenAiCompatConfig::new("openai", format!("{server_url}/v1")),
        credentials,
    )
}

#[tokio::test]
async fn test_stream_happy_path_over_http() {
    let server = MockServer::start().await;
    let body = "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"},\"finish_reason\":\"stop\"}],\
                \"usage\":{\"prompt_tokens\":5,\"completion_tokens\":1}}\n\ndata: [DONE]\n\n";
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let provider = provider_for(&server.uri());
    let model = provider.model("gpt-4o").unwrap();
    let mut stream = model
        .stream(GenerateRequest::new(vec![Message::user("hi")]))
        .await
        .unwrap();

    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event.unwrap());
    }
    assert_eq!(events[0], StreamEvent::TextDelta { delta: "ok".to_string() });
    assert!(matches!(
        events[1],
        StreamEvent::Finish { reason: FinishReason::Stop, .. }
    ));
}

#[tokio::test]
async fn test_429_classified_with_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "7")
                .set_body_string("{\"error\":{\"message\":\"rate limited\",\"code\":\"rate_limit_exceeded\"}}"),
        )
        .mount(&server)
        .await;

    let provider = provider_for(&server.uri());
    let model = provider.model("gpt-4o").unwrap();
    let err = match model
        .stream(GenerateRequest::new(vec![Message::user("hi")]))
        .await
    {
        Err(e) => e,
        Ok(_) => panic!("expected error"),
    };

    match err {
        SdkError::RateLimitExceeded { retry_after, .. } => {
            assert_eq!(retry_after, Some(std::time::Duration::from_secs(7)));
        }
        other => panic!("expected rate limit, got {other}"),
    }
}

#[tokio::test]
async fn test_401_is_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string(
            "{\"error\":{\"message\":\"bad key\",\"code\":\"invalid_api_key\"}}",
        ))
        .mount(&server)
        .await;

    let provider = provider_for(&server.uri());
    let model = provider.model("gpt-4o").unwrap();
    let err = match model
        .stream(GenerateRequest::new(vec![Message::user("hi")]))
        .await
    {
        Err(e) => e,
        Ok(_) => panic!("expected error"),
    };
    assert!(matches!(err, SdkError::AuthenticationFailed(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_500_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let provider = provider_for(&server.uri());
    let model = provider.model("gpt-4o").unwrap();
    let err = match model
        .stream(GenerateRequest::new(vec![Message::user("hi")]))
        .await
    {
        Err(e) => e,
        Ok(_) => panic!("expected error"),
    };
    assert!(err.is_retryable());
}
