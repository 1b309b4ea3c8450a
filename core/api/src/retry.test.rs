use super::*;
use strand_sdk::SdkError;

fn rate_limited(retry_after: Option<Duration>) -> ApiError {
    ApiError::Sdk(SdkError::RateLimitExceeded {
        message: "slow down".to_string(),
        retry_after,
    })
}

fn network() -> ApiError {
    ApiError::Sdk(SdkError::NetworkError("connection reset".to_string()))
}

fn fast_config() -> RetryConfig {
    RetryConfig::default()
        .with_base_delay(Duration::from_millis(100))
        .with_min_interval(Duration::ZERO)
        .with_jitter_ratio(0.0)
}

#[test]
fn test_config_defaults() {
    let config = RetryConfig::default();
    assert_eq!(config.budget_ms, 604_800_000); // 7 days
    assert_eq!(config.max_delay_ms, 1_200_000); // 20 min
    assert_eq!(config.min_interval_ms, 30_000); // 30 s
    assert_eq!(config.base_delay_ms, 1_000); // 1 s
}

#[test]
fn test_non_retryable_gives_up() {
    let mut ctx = RetryContext::with_defaults();
    let err = ApiError::Sdk(SdkError::InvalidRequest("bad".to_string()));
    assert_eq!(ctx.decide(&err), RetryDecision::GiveUp);
    assert_eq!(ctx.attempt(), 0);
}

#[test]
fn test_backoff_doubles_per_attempt() {
    let mut ctx = RetryContext::new(fast_config());

    match ctx.decide(&network()) {
        RetryDecision::Retry { delay } => assert_eq!(delay, Duration::from_millis(100)),
        other => panic!("expected retry, got {other:?}"),
    }
    match ctx.decide(&network()) {
        RetryDecision::Retry { delay } => assert_eq!(delay, Duration::from_millis(200)),
        other => panic!("expected retry, got {other:?}"),
    }
    match ctx.decide(&network()) {
        RetryDecision::Retry { delay } => assert_eq!(delay, Duration::from_millis(400)),
        other => panic!("expected retry, got {other:?}"),
    }
}

#[test]
fn test_backoff_capped_at_max_delay() {
    let mut ctx = RetryContext::new(
        fast_config()
            .with_base_delay(Duration::from_secs(10))
            .with_max_delay(Duration::from_secs(5)),
    );
    match ctx.decide(&network()) {
        RetryDecision::Retry { delay } => assert_eq!(delay, Duration::from_secs(5)),
        other => panic!("expected retry, got {other:?}"),
    }
}

#[test]
fn test_retry_after_dominates_backoff() {
    let mut ctx = RetryContext::new(fast_config());
    let err = rate_limited(Some(Duration::from_secs(3)));
    match ctx.decide(&err) {
        RetryDecision::Retry { delay } => assert_eq!(delay, Duration::from_secs(3)),
        other => panic!("expected retry, got {other:?}"),
    }
}

#[test]
fn test_min_interval_floor() {
    let mut ctx = RetryContext::new(
        fast_config().with_min_interval(Duration::from_millis(500)),
    );
    // Backoff (100ms) and retry-after (1ms) both below the floor.
    let err = rate_limited(Some(Duration::from_millis(1)));
    match ctx.decide(&err) {
        RetryDecision::Retry { delay } => assert_eq!(delay, Duration::from_millis(500)),
        other => panic!("expected retry, got {other:?}"),
    }
}

#[test]
fn test_retry_after_exceeding_budget_exhausts_without_sleeping() {
    let mut ctx = RetryContext::new(
        fast_config().with_budget(Duration::from_secs(10)),
    );
    // Server asks for a wait longer than the whole budget.
    let err = rate_limited(Some(Duration::from_secs(60)));
    let before = std::time::Instant::now();
    assert_eq!(ctx.decide(&err), RetryDecision::BudgetExhausted);
    // decide() must not sleep.
    assert!(before.elapsed() < Duration::from_millis(100));
}

#[test]
fn test_budget_shrinks_with_elapsed_time() {
    let ctx = RetryContext::new(RetryConfig::default().with_budget(Duration::from_secs(60)));
    let remaining = ctx.remaining_budget_ms();
    assert!(remaining <= 60_000);
    assert!(remaining > 59_000);
}

#[test]
fn test_jitter_stays_within_ratio() {
    let config = RetryConfig::default()
        .with_base_delay(Duration::from_millis(1_000))
        .with_min_interval(Duration::ZERO)
        .with_jitter_ratio(0.1);
    for _ in 0..50 {
        let mut ctx = RetryContext::new(config.clone());
        match ctx.decide(&network()) {
            RetryDecision::Retry { delay } => {
                assert!(delay >= Duration::from_millis(1_000), "delay {delay:?}");
                assert!(delay <= Duration::from_millis(1_100), "delay {delay:?}");
            }
            other => panic!("expected retry, got {other:?}"),
        }
    }
}

#[test]
fn test_serde_defaults() {
    let config: RetryConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config.budget_ms, 604_800_000);
    assert_eq!(config.multiplier, 2.0);
}
