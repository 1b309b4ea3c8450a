use super::*;
use http::HeaderValue;

fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
        map.insert(
            http::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
    }
    map
}

#[test]
fn test_no_headers_yields_none() {
    assert!(RateLimitSnapshot::from_headers(&HeaderMap::new()).is_none());
}

#[test]
fn test_openai_style_headers() {
    let map = headers(&[
        ("x-ratelimit-remaining-requests", "42"),
        ("x-ratelimit-remaining-tokens", "90000"),
    ]);
    let snapshot = RateLimitSnapshot::from_headers(&map).unwrap();
    assert_eq!(snapshot.remaining_requests, Some(42));
    assert_eq!(snapshot.remaining_tokens, Some(90000));
    assert!(!snapshot.is_exhausted());
}

#[test]
fn test_anthropic_style_headers() {
    let map = headers(&[("anthropic-ratelimit-requests-remaining", "0")]);
    let snapshot = RateLimitSnapshot::from_headers(&map).unwrap();
    assert_eq!(snapshot.remaining_requests, Some(0));
    assert!(snapshot.is_exhausted());
}

#[test]
fn test_retry_after_seconds() {
    let map = headers(&[("retry-after", "30")]);
    let snapshot = RateLimitSnapshot::from_headers(&map).unwrap();
    assert_eq!(snapshot.retry_after, Some(Duration::from_secs(30)));
}

#[test]
fn test_retry_after_http_date_in_future() {
    let future = chrono::Utc::now() + chrono::Duration::seconds(90);
    let wait = parse_retry_after_value(&future.to_rfc2822()).unwrap();
    // Allow a little slack for the wall clock between formatting and parsing.
    assert!(wait >= Duration::from_secs(85), "wait was {wait:?}");
    assert!(wait <= Duration::from_secs(90), "wait was {wait:?}");
}

#[test]
fn test_retry_after_http_date_in_past_clamps_to_zero() {
    let past = chrono::Utc::now() - chrono::Duration::seconds(90);
    assert_eq!(parse_retry_after_value(&past.to_rfc2822()), Some(Duration::ZERO));
}

#[test]
fn test_unparseable_retry_after_ignored() {
    assert_eq!(parse_retry_after_value("soon"), None);
    let map = headers(&[("retry-after", "soon")]);
    assert!(RateLimitSnapshot::from_headers(&map).is_none());
}
