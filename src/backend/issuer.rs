//! Mints API keys for roles.

use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Instrument};

use super::client_cache::ClientCache;
use super::context::RequestContext;
use super::lease::{InternalData, LeaseMetadata, LeaseSettings};
use super::role_store::{Role, RoleStore};
use crate::backend_span;
use crate::errors::Result;
use crate::observability::metrics;
use crate::provider::{ApiKeyScope, CreateApiKeyRequest};
use crate::secrets::SecretString;

/// Default prefix of minted key descriptions
pub const DESCRIPTION_PREFIX: &str = "packet-secrets";

/// A freshly minted key and the lease that governs it.
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    pub api_key_id: String,
    pub token: SecretString,
    pub role: String,
    pub scope: ApiKeyScope,
    pub lease: LeaseMetadata,
}

impl IssuedCredential {
    /// Data returned to the caller. This is the only time the token is exposed.
    pub fn response_data(&self) -> Value {
        json!({
            "api_key_id": self.api_key_id,
            "api_key_token": self.token.expose_secret(),
            "scope": self.scope.to_string(),
        })
    }
}

/// Provider-side description; Packet keys have no expiry so the TTL is recorded here.
pub fn key_description(role: &Role, ttl: Duration) -> String {
    let prefix = role.description.as_deref().unwrap_or(DESCRIPTION_PREFIX);
    format!("{} role={} ttl={}s", prefix, role.name, ttl.as_secs())
}

#[derive(Debug, Clone)]
pub struct CredentialIssuer {
    roles: RoleStore,
    cache: Arc<ClientCache>,
    lease_settings: LeaseSettings,
}

impl CredentialIssuer {
    pub fn new(roles: RoleStore, cache: Arc<ClientCache>, lease_settings: LeaseSettings) -> Self {
        Self { roles, cache, lease_settings }
    }

    /// Mint a key for `role_name`.
    ///
    /// The role is resolved before any provider traffic, so an unknown role
    /// never reaches the provider. A provider failure leaves no key behind.
    pub async fn issue(
        &self,
        ctx: &RequestContext,
        role_name: &str,
        requested_ttl: Option<Duration>,
    ) -> Result<IssuedCredential> {
        let span = backend_span!("issue", role = %role_name);

        async move {
            let role = self.roles.get(role_name).await?;
            let ttl = self.lease_settings.resolve_ttl(&role, requested_ttl);
            let (_, max_ttl) = self.lease_settings.role_bounds(&role);

            if let Some(requested) = requested_ttl.filter(|requested| *requested > ttl) {
                warn!(
                    requested_secs = requested.as_secs(),
                    granted_secs = ttl.as_secs(),
                    "Requested TTL exceeds role maximum, capping"
                );
            }

            let client = self.cache.get(ctx).await?;
            let request = CreateApiKeyRequest {
                scope: role.scope.clone(),
                description: key_description(&role, ttl),
                read_only: role.read_only,
                ttl,
            };
            let key = client.create_api_key(ctx, &request).await?;

            let internal = InternalData::new(&key.id, &role.name, role.scope.clone());
            let lease = LeaseMetadata {
                ttl,
                max_ttl,
                renewable: true,
                issue_time: Utc::now(),
                internal: internal.to_map()?,
            };

            info!(api_key_id = %key.id, scope = %role.scope, ttl_secs = ttl.as_secs(), "Issued credential");
            metrics::record_credential_issued(&role.name);

            Ok(IssuedCredential {
                api_key_id: key.id,
                token: key.token,
                role: role.name,
                scope: role.scope,
                lease,
            })
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_description() {
        let mut role = Role {
            name: "readonly".to_string(),
            scope: ApiKeyScope::User,
            read_only: true,
            description: None,
            ttl: Duration::ZERO,
            max_ttl: Duration::ZERO,
        };
        assert_eq!(
            key_description(&role, Duration::from_secs(3600)),
            "packet-secrets role=readonly ttl=3600s"
        );

        role.description = Some("ci".to_string());
        assert_eq!(key_description(&role, Duration::from_secs(90)), "ci role=readonly ttl=90s");
    }
}
