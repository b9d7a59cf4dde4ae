//! # Packet Secrets Backend
//!
//! Root of the credential lifecycle. [`Backend`] routes host controller
//! requests to the configuration and role stores, the issuer and the
//! lifecycle handler, and owns the wiring that invalidates the cached
//! provider client whenever the configuration changes.
//!
//! ```text
//! host ─► Backend ─┬─► ConfigStore ──(config hooks)──► ClientCache
//!                  ├─► RoleStore
//!                  ├─► CredentialIssuer ──► ClientCache ──► provider
//!                  └─► SecretLifecycleHandler ──► ClientCache ──► provider
//! ```

pub mod client_cache;
pub mod config_store;
pub mod context;
pub mod invalidation;
pub mod issuer;
pub mod lease;
pub mod lifecycle;
pub mod role_store;

pub use client_cache::{ClientCache, ClientFactory, PacketClientFactory};
pub use config_store::{ConfigStore, PacketConfig, CONFIG_KEY};
pub use context::RequestContext;
pub use invalidation::{InvalidationHooks, InvalidationListener};
pub use issuer::{CredentialIssuer, IssuedCredential};
pub use lease::{InternalData, LeaseMetadata, LeaseSettings};
pub use lifecycle::SecretLifecycleHandler;
pub use role_store::{Role, RoleStore};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, Instrument};

use crate::errors::{Error, Result};
use crate::storage::Storage;

const HELP: &str = "\
The Packet secrets backend mints Packet (Equinix Metal) API keys on demand.

After writing the root API token to the 'config' endpoint, create roles under
'roles/<name>' describing the key scope (user or project), whether keys are
read-only, and their TTL bounds. Reading 'creds/<name>' mints a new key whose
lease is tracked by the host; keys are deleted from Packet when the lease is
revoked or expires.";

/// Operation requested on a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Read,
    Create,
    Update,
    Delete,
    List,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Read => "read",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::List => "list",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub operation: Operation,
    pub path: String,
    pub data: Map<String, Value>,
}

impl Request {
    pub fn new(operation: Operation, path: impl Into<String>) -> Self {
        Self { operation, path: path.into(), data: Map::new() }
    }

    /// Attach a JSON object body. Non-object values are ignored.
    pub fn with_data(mut self, data: Value) -> Self {
        if let Value::Object(map) = data {
            self.data = map;
        }
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Response {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<LeaseMetadata>,
}

impl Response {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_data(data: Value) -> Self {
        Self { data: Some(data), secret: None }
    }
}

pub struct Backend {
    hooks: Arc<InvalidationHooks>,
    config_store: ConfigStore,
    role_store: RoleStore,
    cache: Arc<ClientCache>,
    issuer: CredentialIssuer,
    lifecycle: SecretLifecycleHandler,
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend").field("hooks", &self.hooks).field("cache", &self.cache).finish()
    }
}

impl Backend {
    /// Assemble the backend and register the `config` invalidation hook.
    pub fn new(
        storage: Arc<dyn Storage>,
        factory: Arc<dyn ClientFactory>,
        lease_settings: LeaseSettings,
    ) -> Self {
        let cache = Arc::new(ClientCache::new(storage.clone(), factory));

        let mut hooks = InvalidationHooks::new();
        hooks.subscribe(CONFIG_KEY, cache.clone());
        let hooks = Arc::new(hooks);

        let role_store = RoleStore::new(storage.clone());
        Self {
            config_store: ConfigStore::new(storage, hooks.clone()),
            issuer: CredentialIssuer::new(role_store.clone(), cache.clone(), lease_settings),
            lifecycle: SecretLifecycleHandler::new(role_store.clone(), cache.clone(), lease_settings),
            role_store,
            cache,
            hooks,
        }
    }

    /// Backend talking to the real Packet API with the default retry policy.
    pub fn with_packet_client(storage: Arc<dyn Storage>, lease_settings: LeaseSettings) -> Self {
        Self::new(storage, Arc::new(PacketClientFactory::default()), lease_settings)
    }

    pub fn help(&self) -> &'static str {
        HELP
    }

    pub fn client_cache(&self) -> &Arc<ClientCache> {
        &self.cache
    }

    /// Route one host request.
    pub async fn handle_request(&self, ctx: &RequestContext, request: Request) -> Result<Response> {
        let path = request.path.trim_start_matches('/').to_string();
        let span = crate::backend_span!("handle_request", path = %path, op = %request.operation);

        async move {
            ctx.check()?;
            debug!("Handling request");

            if path == "config" {
                return self.handle_config(request.operation, &request.data).await;
            }
            if path == "roles" || path == "roles/" {
                return match request.operation {
                    Operation::List => self.list_roles().await,
                    op => Err(unsupported(op, &path)),
                };
            }
            if let Some(name) = path.strip_prefix("roles/") {
                return self.handle_role(request.operation, name, &request.data).await;
            }
            if let Some(name) = path.strip_prefix("creds/").filter(|name| !name.is_empty()) {
                return match request.operation {
                    Operation::Read | Operation::Create | Operation::Update => {
                        self.issue(ctx, name, &request.data).await
                    }
                    op => Err(unsupported(op, &path)),
                };
            }

            Err(unsupported(request.operation, &path))
        }
        .instrument(span)
        .await
    }

    async fn handle_config(&self, operation: Operation, data: &Map<String, Value>) -> Result<Response> {
        match operation {
            Operation::Read => Ok(match self.config_store.read().await? {
                Some(config) => Response::with_data(config.to_response()),
                None => Response::empty(),
            }),
            Operation::Create | Operation::Update => {
                let config = PacketConfig::from_request(data)?;
                self.config_store.write(&config).await?;
                Ok(Response::empty())
            }
            Operation::Delete => {
                self.config_store.delete().await?;
                Ok(Response::empty())
            }
            Operation::List => Err(unsupported(operation, CONFIG_KEY)),
        }
    }

    async fn handle_role(
        &self,
        operation: Operation,
        name: &str,
        data: &Map<String, Value>,
    ) -> Result<Response> {
        match operation {
            Operation::Read => Ok(match self.role_store.read(name).await? {
                Some(role) => Response::with_data(role.to_response()),
                None => Response::empty(),
            }),
            Operation::Create | Operation::Update => {
                let role = Role::from_request(name, data)?;
                self.role_store.write(&role).await?;
                Ok(Response::empty())
            }
            Operation::Delete => {
                role_store::validate_role_name(name)?;
                self.role_store.delete(name).await?;
                Ok(Response::empty())
            }
            Operation::List => Err(unsupported(operation, &format!("roles/{}", name))),
        }
    }

    async fn list_roles(&self) -> Result<Response> {
        let names = self.role_store.list().await?;
        Ok(Response::with_data(json!({ "keys": names })))
    }

    async fn issue(&self, ctx: &RequestContext, role: &str, data: &Map<String, Value>) -> Result<Response> {
        let requested_ttl = requested_duration(data, "ttl")?;
        let credential = self.issuer.issue(ctx, role, requested_ttl).await?;

        Ok(Response { data: Some(credential.response_data()), secret: Some(credential.lease) })
    }

    /// Host callback: extend a lease by `increment` (or the role default).
    pub async fn renew_secret(
        &self,
        ctx: &RequestContext,
        lease: &LeaseMetadata,
        increment: Option<Duration>,
    ) -> Result<LeaseMetadata> {
        ctx.check()?;
        self.lifecycle.renew(ctx, lease, increment).await
    }

    /// Host callback: revoke the key behind a lease. Safe to retry.
    pub async fn revoke_secret(&self, ctx: &RequestContext, lease: &LeaseMetadata) -> Result<()> {
        ctx.check()?;
        self.lifecycle.revoke(ctx, lease).await
    }

    /// Host notification that the stored record under `key` changed.
    pub async fn invalidate(&self, key: &str) {
        self.hooks.notify(key).await;
    }
}

fn unsupported(operation: Operation, path: &str) -> Error {
    Error::unsupported_path(format!("{} {}", operation, path))
}

fn requested_duration(data: &Map<String, Value>, field: &str) -> Result<Option<Duration>> {
    match data.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => role_store::parse_duration(value)
            .map(|d| Some(d).filter(|d| !d.is_zero()))
            .map_err(|e| Error::invalid_request(format!("{}: {}", field, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockProvider;
    use crate::storage::InMemoryStorage;

    fn backend(provider: &MockProvider) -> Backend {
        Backend::new(
            Arc::new(InMemoryStorage::new()),
            Arc::new(provider.factory()),
            LeaseSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_unknown_paths_are_rejected() {
        let provider = MockProvider::new();
        let backend = backend(&provider);
        let ctx = RequestContext::new();

        for request in [
            Request::new(Operation::Read, "nope"),
            Request::new(Operation::List, "config"),
            Request::new(Operation::Delete, "creds/readonly"),
            Request::new(Operation::Read, "creds/"),
            Request::new(Operation::Create, "roles/"),
        ] {
            let err = backend.handle_request(&ctx, request).await.unwrap_err();
            assert!(matches!(err, Error::UnsupportedPath { .. }), "got {:?}", err);
        }
    }

    #[tokio::test]
    async fn test_config_read_hides_token() {
        let provider = MockProvider::new();
        let backend = backend(&provider);
        let ctx = RequestContext::new();

        let response = backend.handle_request(&ctx, Request::new(Operation::Read, "config")).await.unwrap();
        assert!(response.data.is_none());

        backend
            .handle_request(
                &ctx,
                Request::new(Operation::Update, "/config").with_data(json!({"api_token": "T1"})),
            )
            .await
            .unwrap();

        let response = backend.handle_request(&ctx, Request::new(Operation::Read, "config")).await.unwrap();
        let data = response.data.unwrap();
        assert_eq!(data["api_token_set"], true);
        assert!(!data.to_string().contains("T1"));
    }

    #[tokio::test]
    async fn test_roles_list_and_read() {
        let provider = MockProvider::new();
        let backend = backend(&provider);
        let ctx = RequestContext::new();

        for name in ["zeta", "alpha"] {
            backend
                .handle_request(&ctx, Request::new(Operation::Create, format!("roles/{}", name)))
                .await
                .unwrap();
        }

        let listed = backend.handle_request(&ctx, Request::new(Operation::List, "roles/")).await.unwrap();
        assert_eq!(listed.data.unwrap(), json!({"keys": ["alpha", "zeta"]}));

        let read = backend.handle_request(&ctx, Request::new(Operation::Read, "roles/alpha")).await.unwrap();
        assert_eq!(read.data.unwrap()["type"], "user");

        let missing = backend.handle_request(&ctx, Request::new(Operation::Read, "roles/none")).await.unwrap();
        assert!(missing.data.is_none());
    }

    #[tokio::test]
    async fn test_invalid_requested_ttl() {
        let provider = MockProvider::new();
        let backend = backend(&provider);
        let ctx = RequestContext::new();

        let err = backend
            .handle_request(
                &ctx,
                Request::new(Operation::Read, "creds/readonly").with_data(json!({"ttl": "soon"})),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest { .. }));
        assert_eq!(provider.create_calls(), 0);
    }

    #[test]
    fn test_help_text() {
        let provider = MockProvider::new();
        assert!(backend(&provider).help().contains("creds/<name>"));
    }
}
