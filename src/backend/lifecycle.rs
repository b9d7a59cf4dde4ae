//! Renew and revoke callbacks for issued credentials.
//!
//! Both are driven entirely by the host controller with the lease metadata it
//! was handed at issuance. Nothing here tracks time on its own.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn, Instrument};

use super::client_cache::ClientCache;
use super::context::RequestContext;
use super::lease::{InternalData, LeaseMetadata, LeaseSettings};
use super::role_store::RoleStore;
use crate::backend_span;
use crate::errors::{Error, Result};
use crate::observability::metrics;

#[derive(Debug, Clone)]
pub struct SecretLifecycleHandler {
    roles: RoleStore,
    cache: Arc<ClientCache>,
    lease_settings: LeaseSettings,
}

impl SecretLifecycleHandler {
    pub fn new(roles: RoleStore, cache: Arc<ClientCache>, lease_settings: LeaseSettings) -> Self {
        Self { roles, cache, lease_settings }
    }

    /// Extend a lease.
    ///
    /// Packet keys cannot be extended server-side, so renewal checks that the
    /// key still exists and then grants `min(increment, time left before max_ttl)`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidLease`] if the internal data is unusable
    /// - [`Error::NotRenewable`] if the key is gone or the lease hit its maximum
    /// - classified provider errors from the health check
    pub async fn renew(
        &self,
        ctx: &RequestContext,
        lease: &LeaseMetadata,
        increment: Option<Duration>,
    ) -> Result<LeaseMetadata> {
        let result = self.renew_inner(ctx, lease, increment).await;
        match &result {
            Ok(_) => metrics::record_renewal("renewed"),
            Err(e) => metrics::record_renewal(e.kind().as_str()),
        }
        result
    }

    async fn renew_inner(
        &self,
        ctx: &RequestContext,
        lease: &LeaseMetadata,
        increment: Option<Duration>,
    ) -> Result<LeaseMetadata> {
        let data = InternalData::from_map(&lease.internal)?;
        let span = backend_span!("renew", api_key_id = %data.api_key_id, role = %data.role);

        async move {
            if !lease.renewable {
                return Err(Error::not_renewable("lease was issued as non-renewable"));
            }

            let client = self.cache.get(ctx).await?;
            if client.lookup_api_key(ctx, &data.scope, &data.api_key_id).await?.is_none() {
                warn!("API key no longer exists on provider");
                return Err(Error::not_renewable(format!(
                    "API key {} no longer exists",
                    data.api_key_id
                )));
            }

            let remaining = lease.remaining(Utc::now());
            if remaining.is_zero() {
                return Err(Error::not_renewable("lease has reached its maximum TTL"));
            }

            let increment = match increment.filter(|i| !i.is_zero()) {
                Some(increment) => increment,
                None => self.default_increment(&data.role, lease).await?,
            };
            let ttl = increment.min(remaining);

            info!(ttl_secs = ttl.as_secs(), remaining_secs = remaining.as_secs(), "Renewed lease");
            Ok(LeaseMetadata { ttl, ..lease.clone() })
        }
        .instrument(span)
        .await
    }

    /// Role default if the role still exists, else the lease's current TTL.
    async fn default_increment(&self, role_name: &str, lease: &LeaseMetadata) -> Result<Duration> {
        Ok(match self.roles.read(role_name).await? {
            Some(role) => self.lease_settings.role_bounds(&role).0,
            None => {
                debug!(role = %role_name, "Role deleted since issuance, keeping lease TTL");
                lease.ttl
            }
        })
    }

    /// Delete the key behind a lease.
    ///
    /// A key the provider no longer has counts as revoked. Any other failure
    /// is returned so the host retries with the same lease.
    pub async fn revoke(&self, ctx: &RequestContext, lease: &LeaseMetadata) -> Result<()> {
        let data = match InternalData::from_map(&lease.internal) {
            Ok(data) => data,
            Err(e) => {
                metrics::record_credential_revoked(e.kind().as_str());
                return Err(e);
            }
        };
        let span = backend_span!("revoke", api_key_id = %data.api_key_id, role = %data.role);

        async move {
            let result = match self.cache.get(ctx).await {
                Ok(client) => client.delete_api_key(ctx, &data.api_key_id).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => {
                    info!("Revoked credential");
                    metrics::record_credential_revoked("revoked");
                    Ok(())
                }
                Err(Error::CredentialNotFound { .. }) => {
                    debug!("API key already gone, treating as revoked");
                    metrics::record_credential_revoked("already_gone");
                    Ok(())
                }
                Err(e) => {
                    warn!(error = %e, retriable = e.is_retriable(), "Failed to revoke credential");
                    metrics::record_credential_revoked(e.kind().as_str());
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }
}
