//! Credential resolution capability.
//!
//! The engine core never knows how credentials are stored. It asks a
//! [`CredentialResolver`] for a per-request [`ProviderCredential`]: a set of
//! header mutations plus an optional base-URL override. Concrete resolvers
//! (static API key, environment lookup, refreshing token) are swappable.
//!
//! Token refresh is serialized per provider: [`RefreshingResolver`] holds the
//! cached token behind an async mutex, so exactly one refresh is in flight
//! and every concurrent caller observes the refreshed value.

use std::collections::HashMap;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::error::SdkError;

/// Headers and routing applied to one outgoing request.
#[derive(Debug, Clone, Default)]
pub struct ProviderCredential {
    headers: Vec<(String, String)>,
    /// Overrides the provider's default base URL when set.
    pub base_url: Option<String>,
}

impl ProviderCredential {
    /// No credentials at all.
    pub fn none() -> Self {
        Self::default()
    }

    /// A bearer-token credential.
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            headers: vec![("authorization".to_string(), format!("Bearer {}", token.into()))],
            base_url: None,
        }
    }

    /// A single-header credential (e.g. `x-api-key`).
    pub fn header(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            headers: vec![(name.into(), value.into())],
            base_url: None,
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the base-URL override.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Apply the header mutations to a request builder.
    pub fn apply(&self, mut request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }
        request
    }

    /// The headers this credential sets.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }
}

/// Capability supplying per-request credentials for providers.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// Resolve the credential for a provider.
    async fn for_provider(&self, provider_id: &str) -> Result<ProviderCredential>;
}

/// Resolver that sends no credentials.
#[derive(Debug, Default)]
pub struct AnonymousResolver;

#[async_trait]
impl CredentialResolver for AnonymousResolver {
    async fn for_provider(&self, _provider_id: &str) -> Result<ProviderCredential> {
        Ok(ProviderCredential::none())
    }
}

/// Resolver backed by a static per-provider credential map.
#[derive(Debug, Default)]
pub struct StaticKeyResolver {
    credentials: HashMap<String, ProviderCredential>,
}

impl StaticKeyResolver {
    /// Create an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a credential for a provider.
    pub fn with(mut self, provider_id: impl Into<String>, credential: ProviderCredential) -> Self {
        self.credentials.insert(provider_id.into(), credential);
        self
    }
}

#[async_trait]
impl CredentialResolver for StaticKeyResolver {
    async fn for_provider(&self, provider_id: &str) -> Result<ProviderCredential> {
        self.credentials
            .get(provider_id)
            .cloned()
            .ok_or_else(|| {
                SdkError::AuthenticationFailed(format!(
                    "no credentials configured for provider '{provider_id}'"
                ))
            })
    }
}

/// A token minted by a [`TokenSource`].
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The access token.
    pub access_token: String,
    /// How long the token is valid, when the issuer says.
    pub expires_in: Option<Duration>,
}

/// Source of fresh access tokens (e.g. an OAuth refresh flow).
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Mint a fresh token. Called only while the resolver's refresh lock is
    /// held, so implementations need not guard against concurrent refreshes.
    async fn refresh(&self) -> Result<IssuedToken>;
}

struct CachedToken {
    token: String,
    expires_at: Option<Instant>,
}

impl CachedToken {
    fn is_valid(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(deadline) => now < deadline,
            None => true,
        }
    }
}

/// Resolver that caches a bearer token and refreshes it on expiry.
///
/// The cache sits behind an async mutex: concurrent callers needing a refresh
/// queue on the lock, the first one refreshes, the rest observe the new token.
pub struct RefreshingResolver {
    provider_id: String,
    source: Box<dyn TokenSource>,
    /// Safety margin subtracted from the issuer-reported lifetime.
    early_expiry: Duration,
    cached: Mutex<Option<CachedToken>>,
}

impl RefreshingResolver {
    /// Create a resolver for one provider.
    pub fn new(provider_id: impl Into<String>, source: Box<dyn TokenSource>) -> Self {
        Self {
            provider_id: provider_id.into(),
            source,
            early_expiry: Duration::from_secs(30),
            cached: Mutex::new(None),
        }
    }

    /// Set the early-expiry margin.
    pub fn with_early_expiry(mut self, margin: Duration) -> Self {
        self.early_expiry = margin;
        self
    }

    async fn current_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        let now = Instant::now();

        if let Some(entry) = cached.as_ref() {
            if entry.is_valid(now) {
                return Ok(entry.token.clone());
            }
        }

        debug!(provider = %self.provider_id, "Refreshing provider token");
        let issued = self.source.refresh().await?;
        let expires_at = issued
            .expires_in
            .map(|ttl| now + ttl.saturating_sub(self.early_expiry));
        let token = issued.access_token.clone();
        *cached = Some(CachedToken {
            token: issued.access_token,
            expires_at,
        });
        Ok(token)
    }
}

#[async_trait]
impl CredentialResolver for RefreshingResolver {
    async fn for_provider(&self, provider_id: &str) -> Result<ProviderCredential> {
        if provider_id != self.provider_id {
            return Err(SdkError::AuthenticationFailed(format!(
                "resolver holds credentials for '{}', not '{provider_id}'",
                self.provider_id
            )));
        }
        let token = self.current_token().await?;
        Ok(ProviderCredential::bearer(token))
    }
}

#[cfg(test)]
#[path = "credentials.test.rs"]
mod tests;
