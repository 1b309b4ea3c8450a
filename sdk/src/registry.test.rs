use super::*;
use crate::provider::EventStream;
use crate::request::GenerateRequest;
use async_trait::async_trait;

struct StubModel {
    provider: String,
    model: String,
}

#[async_trait]
impl Model for StubModel {
    fn provider_id(&self) -> &str {
        &self.provider
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn stream(&self, _request: GenerateRequest) -> Result<EventStream> {
        Ok(Box::pin(futures::stream::empty()))
    }
}

struct StubProvider {
    name: String,
}

impl Provider for StubProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self, model_id: &str) -> Result<Arc<dyn Model>> {
        Ok(Arc::new(StubModel {
            provider: self.name.clone(),
            model: model_id.to_string(),
        }))
    }
}

fn provider(name: &str) -> Arc<dyn Provider> {
    Arc::new(StubProvider {
        name: name.to_string(),
    })
}

#[test]
fn test_register_and_get() {
    let registry = ProviderRegistry::new();
    registry.register(provider("openai"));
    assert!(registry.get("openai").is_some());
    assert!(registry.get("anthropic").is_none());
    assert_eq!(registry.list(), vec!["openai".to_string()]);
}

#[test]
fn test_resolve_qualified() {
    let registry = ProviderRegistry::new();
    registry.register(provider("openai"));

    let (model, spec) = registry.resolve_str("openai/gpt-4o").unwrap();
    assert_eq!(model.provider_id(), "openai");
    assert_eq!(model.model_id(), "gpt-4o");
    assert_eq!(spec, strand_protocol::ModelSpec::new("openai", "gpt-4o"));
}

#[test]
fn test_resolve_unknown_provider() {
    let registry = ProviderRegistry::new();
    registry.register(provider("openai"));

    let err = match registry.resolve_str("missing/gpt-4o") {
        Err(e) => e,
        Ok(_) => panic!("expected error"),
    };
    assert!(matches!(err, SdkError::ProviderNotFound(_)));
}

#[test]
fn test_bare_id_uses_precedence() {
    let registry = ProviderRegistry::with_precedence(vec!["anthropic".to_string()]);
    registry.register(provider("openai"));
    registry.register(provider("anthropic"));

    let (model, spec) = registry.resolve_str("some-model").unwrap();
    assert_eq!(model.provider_id(), "anthropic");
    assert_eq!(spec.provider, "anthropic");
}

#[test]
fn test_bare_id_falls_back_to_registration_order() {
    let registry = ProviderRegistry::with_precedence(vec!["not-registered".to_string()]);
    registry.register(provider("openai"));
    registry.register(provider("anthropic"));

    let (model, _) = registry.resolve_str("some-model").unwrap();
    assert_eq!(model.provider_id(), "openai");
}

#[test]
fn test_bare_id_with_empty_registry() {
    let registry = ProviderRegistry::new();
    let err = match registry.resolve_str("some-model") {
        Err(e) => e,
        Ok(_) => panic!("expected error"),
    };
    assert!(matches!(err, SdkError::ProviderNotFound(_)));
}

#[test]
fn test_model_id_with_slash_resolves() {
    let registry = ProviderRegistry::new();
    registry.register(provider("openrouter"));

    let (model, _) = registry
        .resolve_str("openrouter/meta-llama/llama-3-70b")
        .unwrap();
    assert_eq!(model.model_id(), "meta-llama/llama-3-70b");
}
