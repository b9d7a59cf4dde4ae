//! Lazily built, invalidation-aware provider client.
//!
//! At most one client exists per configuration generation. Readers take the
//! shared lock on the hot path; a miss takes the exclusive lock, re-checks,
//! and only then reads the configuration and builds. Reading the config under
//! the exclusive lock means a build can never start from a record that an
//! invalidation has already superseded.

use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::config_store::{load_config, PacketConfig};
use super::context::RequestContext;
use super::invalidation::InvalidationListener;
use crate::errors::{Error, Result};
use crate::observability::metrics;
use crate::provider::{PacketClient, ProviderApi, RetryPolicy};
use crate::storage::Storage;

/// Builds an authenticated client from a configuration record.
pub trait ClientFactory: Send + Sync + fmt::Debug {
    fn build(&self, config: &PacketConfig) -> Result<Arc<dyn ProviderApi>>;
}

/// Builds [`PacketClient`]s with the given retry policy.
#[derive(Debug, Clone, Default)]
pub struct PacketClientFactory {
    retry_policy: RetryPolicy,
}

impl PacketClientFactory {
    pub fn new(retry_policy: RetryPolicy) -> Self {
        Self { retry_policy }
    }
}

impl ClientFactory for PacketClientFactory {
    fn build(&self, config: &PacketConfig) -> Result<Arc<dyn ProviderApi>> {
        let client = PacketClient::new(
            config.api_token.clone(),
            config.api_url.as_deref(),
            config.user_agent.as_deref(),
        )?
        .with_retry_policy(self.retry_policy.clone());
        Ok(Arc::new(client))
    }
}

#[derive(Debug, Clone)]
struct CachedClient {
    client: Arc<dyn ProviderApi>,
    generation: u64,
}

pub struct ClientCache {
    storage: Arc<dyn Storage>,
    factory: Arc<dyn ClientFactory>,
    slot: RwLock<Option<CachedClient>>,
    generation: AtomicU64,
}

impl fmt::Debug for ClientCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCache")
            .field("factory", &self.factory)
            .field("generation", &self.generation())
            .finish()
    }
}

impl ClientCache {
    pub fn new(storage: Arc<dyn Storage>, factory: Arc<dyn ClientFactory>) -> Self {
        Self { storage, factory, slot: RwLock::new(None), generation: AtomicU64::new(0) }
    }

    /// Current configuration generation, bumped by every invalidation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Return the cached client, building it from the stored configuration on a miss.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConfigured`] if no configuration has been written
    /// - [`Error::Cancelled`] / [`Error::DeadlineExceeded`] if `ctx` ends while waiting
    /// - build errors from the [`ClientFactory`]
    pub async fn get(&self, ctx: &RequestContext) -> Result<Arc<dyn ProviderApi>> {
        {
            let slot = ctx.run(async { Ok(self.slot.read().await) }).await?;
            if let Some(cached) = slot.as_ref() {
                return Ok(cached.client.clone());
            }
        }

        let mut slot = ctx.run(async { Ok(self.slot.write().await) }).await?;
        if let Some(cached) = slot.as_ref() {
            debug!(generation = cached.generation, "Client built by concurrent caller");
            return Ok(cached.client.clone());
        }

        let config = load_config(self.storage.as_ref()).await?.ok_or(Error::NotConfigured)?;
        let client = self.factory.build(&config)?;
        let generation = self.generation();

        info!(generation, api_url = ?config.api_url, "Built provider client");
        metrics::record_client_build();

        *slot = Some(CachedClient { client: client.clone(), generation });
        Ok(client)
    }

    /// Drop the cached client unconditionally.
    pub async fn invalidate(&self) {
        let mut slot = self.slot.write().await;
        let had_client = slot.take().is_some();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        info!(generation, had_client, "Provider client invalidated");
        metrics::record_invalidation();
    }

    pub async fn is_cached(&self) -> bool {
        self.slot.read().await.is_some()
    }
}

#[async_trait]
impl InvalidationListener for ClientCache {
    async fn invalidate(&self, _key: &str) {
        ClientCache::invalidate(self).await;
    }
}
