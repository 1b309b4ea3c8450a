use super::*;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::time::Instant;
use strand_protocol::FinishReason;
use strand_protocol::TokenUsage;
use strand_sdk::SdkError;
use strand_sdk::StreamEvent;
use strand_sdk::provider::EventStream;

/// A model that fails `failures` times before streaming a fixed answer.
struct FlakyModel {
    calls: Arc<AtomicU32>,
    failures: u32,
    error: fn() -> SdkError,
}

#[async_trait]
impl Model for FlakyModel {
    fn provider_id(&self) -> &str {
        "mock"
    }

    fn model_id(&self) -> &str {
        "flaky"
    }

    async fn stream(&self, _request: GenerateRequest) -> strand_sdk::Result<EventStream> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err((self.error)());
        }
        Ok(Box::pin(futures::stream::iter(vec![
            Ok(StreamEvent::TextDelta {
                delta: "ok".to_string(),
            }),
            Ok(StreamEvent::Finish {
                reason: FinishReason::Stop,
                usage: TokenUsage::new(1, 1),
            }),
        ])))
    }
}

fn fast_client() -> ApiClient {
    ApiClient::with_config(ApiClientConfig::default().with_retry(
        RetryConfig::default()
            .with_base_delay(Duration::from_millis(10))
            .with_min_interval(Duration::ZERO)
            .with_jitter_ratio(0.0),
    ))
}

fn rate_limit_error() -> SdkError {
    SdkError::RateLimitExceeded {
        message: "429".to_string(),
        retry_after: Some(Duration::from_millis(50)),
    }
}

#[tokio::test]
async fn test_recovers_after_rate_limit() {
    let calls = Arc::new(AtomicU32::new(0));
    let model = FlakyModel {
        calls: calls.clone(),
        failures: 1,
        error: rate_limit_error,
    };

    let started = Instant::now();
    let mut stream = fast_client()
        .stream_request(&model, GenerateRequest::default(), &CancellationToken::new())
        .await
        .unwrap();

    // The wait between the 429 and the second attempt honors Retry-After.
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first, StreamEvent::TextDelta { delta: "ok".to_string() });
}

#[tokio::test]
async fn test_non_retryable_fails_immediately() {
    let calls = Arc::new(AtomicU32::new(0));
    let model = FlakyModel {
        calls: calls.clone(),
        failures: 5,
        error: || SdkError::AuthenticationFailed("bad key".to_string()),
    };

    let err = match fast_client()
        .stream_request(&model, GenerateRequest::default(), &CancellationToken::new())
        .await
    {
        Err(e) => e,
        Ok(_) => panic!("expected error"),
    };

    assert!(matches!(err, ApiError::Sdk(SdkError::AuthenticationFailed(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_retry_after_beyond_budget_exhausts_without_sleeping() {
    let model = FlakyModel {
        calls: Arc::new(AtomicU32::new(0)),
        failures: 10,
        error: || SdkError::RateLimitExceeded {
            message: "busy".to_string(),
            retry_after: Some(Duration::from_secs(3600)),
        },
    };
    let client = ApiClient::with_config(
        ApiClientConfig::default()
            .with_retry(RetryConfig::default().with_budget(Duration::from_millis(200))),
    );

    let started = Instant::now();
    let err = match client
        .stream_request(&model, GenerateRequest::default(), &CancellationToken::new())
        .await
    {
        Err(e) => e,
        Ok(_) => panic!("expected error"),
    };

    assert!(matches!(err, ApiError::BudgetExhausted { .. }));
    assert!(started.elapsed() < Duration::from_millis(500), "must not sleep");
}

#[tokio::test]
async fn test_interrupt_cancels_backoff_sleep() {
    let model = FlakyModel {
        calls: Arc::new(AtomicU32::new(0)),
        failures: 10,
        error: || SdkError::RateLimitExceeded {
            message: "busy".to_string(),
            retry_after: Some(Duration::from_secs(60)),
        },
    };
    let client = fast_client();
    let interrupt = CancellationToken::new();

    let canceller = interrupt.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        canceller.cancel();
    });

    let started = Instant::now();
    let err = match client
        .stream_request(&model, GenerateRequest::default(), &interrupt)
        .await
    {
        Err(e) => e,
        Ok(_) => panic!("expected error"),
    };

    assert!(matches!(err, ApiError::Interrupted));
    // The 60 s rate-limit wait was cut short by the interrupt alone.
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_network_errors_retried() {
    let calls = Arc::new(AtomicU32::new(0));
    let model = FlakyModel {
        calls: calls.clone(),
        failures: 2,
        error: || SdkError::NetworkError("dns failure".to_string()),
    };

    fast_client()
        .stream_request(&model, GenerateRequest::default(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}
