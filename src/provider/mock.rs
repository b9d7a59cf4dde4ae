//! In-process provider for tests and local development.
//!
//! [`MockProvider`] keeps API keys in memory and records every call, including
//! the root token each client was authenticated with, so tests can assert how
//! the backend talked to the provider.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

use super::{ApiKey, ApiKeyScope, CreateApiKeyRequest, ProviderApi};
use crate::backend::client_cache::ClientFactory;
use crate::backend::config_store::PacketConfig;
use crate::backend::context::RequestContext;
use crate::errors::{Error, Result};
use crate::secrets::SecretString;

/// A failure to inject into the next provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockFailure {
    /// Transient failure after retries gave up
    Unavailable,
    /// Root token rejected
    Auth,
    /// Credential missing
    NotFound,
    /// Non-transient rejection with the given status
    Rejected(u16),
}

impl MockFailure {
    fn into_error(self, id: &str) -> Error {
        match self {
            Self::Unavailable => Error::provider_unavailable("simulated provider outage"),
            Self::Auth => Error::provider_auth("simulated invalid token"),
            Self::NotFound => Error::credential_not_found(id),
            Self::Rejected(status) => Error::provider_rejected(status, "simulated rejection"),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredKey {
    scope: ApiKeyScope,
    token: SecretString,
    description: String,
    read_only: bool,
}

#[derive(Debug, Default)]
struct MockState {
    keys: HashMap<String, StoredKey>,
    built_tokens: Vec<String>,
    auth_contexts: Vec<String>,
    create_calls: usize,
    delete_calls: usize,
    lookup_calls: usize,
    failures: VecDeque<MockFailure>,
    latency: Option<Duration>,
}

#[derive(Debug, Clone, Default)]
pub struct MockProvider {
    state: Arc<Mutex<MockState>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call, racing the request context.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = Some(latency);
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A client authenticated with `token`.
    pub fn client(&self, token: impl Into<String>) -> MockClient {
        MockClient { token: token.into(), provider: self.clone() }
    }

    /// A [`ClientFactory`] producing clients of this provider.
    pub fn factory(&self) -> MockClientFactory {
        MockClientFactory { provider: self.clone() }
    }

    /// Make the next provider call fail with `failure`.
    pub fn fail_next(&self, failure: MockFailure) {
        self.lock().failures.push_back(failure);
    }

    /// Remove a key behind the backend's back.
    pub fn remove_key(&self, id: &str) -> bool {
        self.lock().keys.remove(id).is_some()
    }

    pub fn contains_key(&self, id: &str) -> bool {
        self.lock().keys.contains_key(id)
    }

    pub fn key_count(&self) -> usize {
        self.lock().keys.len()
    }

    pub fn key_description(&self, id: &str) -> Option<String> {
        self.lock().keys.get(id).map(|key| key.description.clone())
    }

    /// Number of clients built through [`MockProvider::factory`].
    pub fn builds(&self) -> usize {
        self.lock().built_tokens.len()
    }

    /// Root tokens of every built client, in build order.
    pub fn built_tokens(&self) -> Vec<String> {
        self.lock().built_tokens.clone()
    }

    /// Root token used for every create call, in call order.
    pub fn auth_contexts(&self) -> Vec<String> {
        self.lock().auth_contexts.clone()
    }

    pub fn create_calls(&self) -> usize {
        self.lock().create_calls
    }

    pub fn delete_calls(&self) -> usize {
        self.lock().delete_calls
    }

    pub fn lookup_calls(&self) -> usize {
        self.lock().lookup_calls
    }

    async fn simulate_latency(&self, ctx: &RequestContext) -> Result<()> {
        let latency = self.lock().latency;
        match latency {
            Some(latency) => ctx.sleep(latency).await,
            None => ctx.check(),
        }
    }
}

/// A [`MockProvider`] client bound to one root token.
#[derive(Debug, Clone)]
pub struct MockClient {
    token: String,
    provider: MockProvider,
}

impl MockClient {
    pub fn token(&self) -> &str {
        &self.token
    }
}

#[async_trait]
impl ProviderApi for MockClient {
    async fn create_api_key(
        &self,
        ctx: &RequestContext,
        request: &CreateApiKeyRequest,
    ) -> Result<ApiKey> {
        self.provider.simulate_latency(ctx).await?;

        let mut state = self.provider.lock();
        state.create_calls += 1;
        state.auth_contexts.push(self.token.clone());
        if let Some(failure) = state.failures.pop_front() {
            return Err(failure.into_error(&request.scope.to_string()));
        }

        let id = Uuid::new_v4().to_string();
        let token = SecretString::new(Uuid::new_v4().simple().to_string());
        state.keys.insert(
            id.clone(),
            StoredKey {
                scope: request.scope.clone(),
                token: token.clone(),
                description: request.description.clone(),
                read_only: request.read_only,
            },
        );

        Ok(ApiKey {
            id,
            token,
            description: Some(request.description.clone()),
            read_only: request.read_only,
            created_at: Some(Utc::now()),
        })
    }

    async fn delete_api_key(&self, ctx: &RequestContext, id: &str) -> Result<()> {
        self.provider.simulate_latency(ctx).await?;

        let mut state = self.provider.lock();
        state.delete_calls += 1;
        if let Some(failure) = state.failures.pop_front() {
            return Err(failure.into_error(id));
        }

        match state.keys.remove(id) {
            Some(_) => Ok(()),
            None => Err(Error::credential_not_found(id)),
        }
    }

    async fn lookup_api_key(
        &self,
        ctx: &RequestContext,
        scope: &ApiKeyScope,
        id: &str,
    ) -> Result<Option<ApiKey>> {
        self.provider.simulate_latency(ctx).await?;

        let mut state = self.provider.lock();
        state.lookup_calls += 1;
        if let Some(failure) = state.failures.pop_front() {
            return Err(failure.into_error(id));
        }

        Ok(state.keys.get(id).filter(|key| &key.scope == scope).map(|key| ApiKey {
            id: id.to_string(),
            token: key.token.clone(),
            description: Some(key.description.clone()),
            read_only: key.read_only,
            created_at: None,
        }))
    }
}

/// [`ClientFactory`] that hands out [`MockClient`]s and records each build.
#[derive(Debug, Clone)]
pub struct MockClientFactory {
    provider: MockProvider,
}

impl ClientFactory for MockClientFactory {
    fn build(&self, config: &PacketConfig) -> Result<Arc<dyn ProviderApi>> {
        let token = config.api_token.expose_secret().to_string();
        self.provider.lock().built_tokens.push(token.clone());
        Ok(Arc::new(self.provider.client(token)))
    }
}
