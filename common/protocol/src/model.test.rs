use super::*;
use crate::usage::TokenCount;
use pretty_assertions::assert_eq;

#[test]
fn test_parse_full_spec() {
    let parsed = ModelRef::parse("openai/gpt-4o").unwrap();
    assert_eq!(parsed, ModelRef::Full(ModelSpec::new("openai", "gpt-4o")));
}

#[test]
fn test_model_id_may_contain_slashes() {
    let parsed = ModelRef::parse("openrouter/meta-llama/llama-3-70b").unwrap();
    assert_eq!(
        parsed,
        ModelRef::Full(ModelSpec::new("openrouter", "meta-llama/llama-3-70b"))
    );
}

#[test]
fn test_parse_bare_id() {
    let parsed = ModelRef::parse("gpt-4o").unwrap();
    assert_eq!(parsed, ModelRef::Bare("gpt-4o".to_string()));
}

#[test]
fn test_parse_rejects_empty_components() {
    assert!(ModelRef::parse("").is_err());
    assert!(ModelRef::parse("  ").is_err());
    assert!(ModelRef::parse("/gpt-4o").is_err());
    assert!(ModelRef::parse("openai/").is_err());
}

#[test]
fn test_spec_display_roundtrip() {
    let spec = ModelSpec::new("openai", "gpt-4o");
    assert_eq!(spec.to_string(), "openai/gpt-4o");
    assert_eq!(spec.to_string().parse::<ModelSpec>().unwrap(), spec);
}

#[test]
fn test_catalog_lookup_and_default() {
    let catalog = ModelCatalog::builtin();
    let known = catalog.info(&ModelSpec::new("openai", "gpt-4o"));
    assert_eq!(known.context_window, 128_000);
    assert!(known.cost.is_some());

    let unknown = catalog.info(&ModelSpec::new("nowhere", "mystery"));
    assert_eq!(unknown, ModelInfo::default());
    assert!(unknown.cost.is_none());
}

#[test]
fn test_cost_known_usage() {
    let info = ModelInfo {
        context_window: 128_000,
        max_output_tokens: 16_384,
        cost: Some(ModelCost {
            input_per_mtok: 2.0,
            output_per_mtok: 10.0,
            cache_read_per_mtok: 0.0,
            cache_write_per_mtok: 0.0,
        }),
    };
    let usage = TokenUsage::new(1_000_000, 100_000);
    let cost = info.compute_cost(&usage);
    assert_eq!(cost, CostTotal::Known(3.0));
}

#[test]
fn test_cost_unknown_when_usage_unknown() {
    let info = ModelCatalog::builtin().info(&ModelSpec::new("openai", "gpt-4o"));
    let mut usage = TokenUsage::new(100, 10);
    usage.output = TokenCount::Unknown;
    assert_eq!(info.compute_cost(&usage), CostTotal::Unknown);
}

#[test]
fn test_cost_unknown_without_pricing() {
    let info = ModelInfo::default();
    assert_eq!(info.compute_cost(&TokenUsage::new(1, 1)), CostTotal::Unknown);
}
