use super::*;
use std::sync::Arc;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

#[tokio::test]
async fn test_anonymous_resolver() {
    let resolver = AnonymousResolver;
    let credential = resolver.for_provider("openai").await.unwrap();
    assert!(credential.headers().is_empty());
    assert!(credential.base_url.is_none());
}

#[tokio::test]
async fn test_static_resolver_hit_and_miss() {
    let resolver = StaticKeyResolver::new().with(
        "openai",
        ProviderCredential::bearer("sk-test").with_base_url("http://localhost:9000/v1"),
    );

    let credential = resolver.for_provider("openai").await.unwrap();
    assert_eq!(
        credential.headers(),
        &[("authorization".to_string(), "Bearer sk-test".to_string())]
    );
    assert_eq!(credential.base_url.as_deref(), Some("http://localhost:9000/v1"));

    let err = resolver.for_provider("anthropic").await.unwrap_err();
    assert!(matches!(err, SdkError::AuthenticationFailed(_)));
}

#[test]
fn test_credential_header_builder() {
    let credential = ProviderCredential::header("x-api-key", "key-1").with_header("x-org", "acme");
    assert_eq!(credential.headers().len(), 2);
}

struct CountingSource {
    calls: Arc<AtomicU32>,
    ttl: Option<Duration>,
}

#[async_trait]
impl TokenSource for CountingSource {
    async fn refresh(&self) -> Result<IssuedToken> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        // Simulate a slow refresh so concurrent callers pile up on the lock.
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(IssuedToken {
            access_token: format!("token-{n}"),
            expires_in: self.ttl,
        })
    }
}

#[tokio::test]
async fn test_refreshing_resolver_single_flight() {
    let calls = Arc::new(AtomicU32::new(0));
    let resolver = Arc::new(RefreshingResolver::new(
        "openai",
        Box::new(CountingSource {
            calls: calls.clone(),
            ttl: None,
        }),
    ));

    // Ten concurrent callers must trigger exactly one refresh, and all of
    // them must observe the refreshed token.
    let mut handles = Vec::new();
    for _ in 0..10 {
        let resolver = resolver.clone();
        handles.push(tokio::spawn(async move {
            resolver.for_provider("openai").await.unwrap()
        }));
    }
    for handle in handles {
        let credential = handle.await.unwrap();
        assert_eq!(
            credential.headers(),
            &[("authorization".to_string(), "Bearer token-1".to_string())]
        );
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_refreshing_resolver_refreshes_after_expiry() {
    let calls = Arc::new(AtomicU32::new(0));
    let resolver = RefreshingResolver::new(
        "openai",
        Box::new(CountingSource {
            calls: calls.clone(),
            ttl: Some(Duration::from_millis(1)),
        }),
    )
    .with_early_expiry(Duration::ZERO);

    resolver.for_provider("openai").await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let credential = resolver.for_provider("openai").await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        credential.headers(),
        &[("authorization".to_string(), "Bearer token-2".to_string())]
    );
}

#[tokio::test]
async fn test_refreshing_resolver_rejects_other_provider() {
    let resolver = RefreshingResolver::new(
        "openai",
        Box::new(CountingSource {
            calls: Arc::new(AtomicU32::new(0)),
            ttl: None,
        }),
    );
    let err = resolver.for_provider("anthropic").await.unwrap_err();
    assert!(matches!(err, SdkError::AuthenticationFailed(_)));
}
