use super::*;
use pretty_assertions::assert_eq;

#[test]
fn test_known_count_serializes_as_number() {
    let json = serde_json::to_value(TokenCount::Known(42)).unwrap();
    assert_eq!(json, serde_json::json!(42));
}

#[test]
fn test_unknown_count_serializes_as_marker() {
    let json = serde_json::to_value(TokenCount::Unknown).unwrap();
    assert_eq!(json, serde_json::json!("unknown"));
}

#[test]
fn test_count_roundtrip() {
    for count in [TokenCount::Known(0), TokenCount::Known(1234), TokenCount::Unknown] {
        let json = serde_json::to_string(&count).unwrap();
        let back: TokenCount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, count);
    }
}

#[test]
fn test_null_deserializes_as_unknown() {
    let count: TokenCount = serde_json::from_str("null").unwrap();
    assert_eq!(count, TokenCount::Unknown);
}

#[test]
fn test_negative_count_rejected() {
    assert!(serde_json::from_str::<TokenCount>("-1").is_err());
}

#[test]
fn test_from_option_treats_negative_as_unknown() {
    assert_eq!(TokenCount::from_option(Some(7)), TokenCount::Known(7));
    assert_eq!(TokenCount::from_option(Some(-7)), TokenCount::Unknown);
    assert_eq!(TokenCount::from_option(None), TokenCount::Unknown);
}

#[test]
fn test_saturating_add() {
    let a = TokenCount::Known(10);
    let b = TokenCount::Known(5);
    assert_eq!(a.saturating_add(b), TokenCount::Known(15));
    assert_eq!(a.saturating_add(TokenCount::Unknown), TokenCount::Unknown);
}

#[test]
fn test_usage_or_fallback_fills_only_unknowns() {
    let primary = TokenUsage {
        input: TokenCount::Known(100),
        output: TokenCount::Unknown,
        reasoning: TokenCount::Unknown,
        cache: CacheUsage::default(),
    };
    let fallback = TokenUsage::new(999, 50);

    let merged = primary.or(fallback);
    assert_eq!(merged.input, TokenCount::Known(100));
    assert_eq!(merged.output, TokenCount::Known(50));
}

#[test]
fn test_usage_is_complete() {
    assert!(TokenUsage::new(1, 2).is_complete());
    assert!(!TokenUsage::unknown().is_complete());
}

#[test]
fn test_usage_json_shape() {
    let usage = TokenUsage::new(10, 20);
    let json = serde_json::to_value(usage).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "input": 10,
            "output": 20,
            "reasoning": "unknown",
            "cache": { "read": "unknown", "write": "unknown" }
        })
    );
}

#[test]
fn test_cost_serialization() {
    assert_eq!(
        serde_json::to_value(CostTotal::Known(0.0125)).unwrap(),
        serde_json::json!(0.0125)
    );
    assert_eq!(
        serde_json::to_value(CostTotal::Unknown).unwrap(),
        serde_json::json!("unknown")
    );
}

#[test]
fn test_cost_rejects_negative() {
    assert!(serde_json::from_str::<CostTotal>("-0.5").is_err());
}
