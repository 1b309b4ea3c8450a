use super::*;
use std::time::Duration;

#[test]
fn test_rate_limit_is_retryable() {
    let err = SdkError::RateLimitExceeded {
        message: "slow down".to_string(),
        retry_after: Some(Duration::from_secs(2)),
    };
    assert!(err.is_retryable());
    assert_eq!(err.retry_delay(), Some(Duration::from_secs(2)));
}

#[test]
fn test_network_is_retryable() {
    assert!(SdkError::NetworkError("connection reset".to_string()).is_retryable());
}

#[test]
fn test_server_errors_are_retryable_client_errors_not() {
    let five_hundred = SdkError::ProviderError {
        code: "internal".to_string(),
        message: "oops".to_string(),
        status: Some(500),
    };
    assert!(five_hundred.is_retryable());

    let bad_request = SdkError::ProviderError {
        code: "bad_request".to_string(),
        message: "nope".to_string(),
        status: Some(400),
    };
    assert!(!bad_request.is_retryable());
}

#[test]
fn test_terminal_errors_not_retryable() {
    assert!(!SdkError::AuthenticationFailed("bad key".to_string()).is_retryable());
    assert!(
        !SdkError::PermissionDenied {
            message: "missing scope".to_string(),
            hint: "re-authorize with the models scope".to_string(),
        }
        .is_retryable()
    );
    assert!(!SdkError::InvalidRequest("bad param".to_string()).is_retryable());
    assert!(!SdkError::ModelNotFound("gpt-unknown".to_string()).is_retryable());
    assert!(!SdkError::ParseError("bad json".to_string()).is_retryable());
}

#[test]
fn test_retry_delay_from_message_body() {
    let err = SdkError::RateLimitExceeded {
        message: "Rate limit reached, try again in 1.5s".to_string(),
        retry_after: None,
    };
    assert_eq!(err.retry_delay(), Some(Duration::from_secs_f64(1.5)));
}

#[test]
fn test_parse_retry_after_patterns() {
    assert_eq!(parse_retry_after("try again in 5s"), Some(Duration::from_secs(5)));
    assert_eq!(
        parse_retry_after("try again in 500ms"),
        Some(Duration::from_millis(500))
    );
    assert_eq!(
        parse_retry_after("Try again in 2.5 seconds"),
        Some(Duration::from_secs_f64(2.5))
    );
    assert_eq!(parse_retry_after("some other error"), None);
}

#[test]
fn test_structured_retry_after_wins_over_message() {
    let err = SdkError::RateLimitExceeded {
        message: "try again in 60s".to_string(),
        retry_after: Some(Duration::from_secs(3)),
    };
    assert_eq!(err.retry_delay(), Some(Duration::from_secs(3)));
}
