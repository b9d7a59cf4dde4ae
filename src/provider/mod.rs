//! Provider API abstraction.
//!
//! The backend mints, inspects and deletes Packet API keys through
//! [`ProviderApi`]. [`PacketClient`] talks to the real API; [`MockProvider`]
//! is an in-process stand-in for tests and local development.

pub mod client;
pub mod mock;
pub mod retry;

pub use client::{PacketClient, DEFAULT_API_URL};
pub use mock::{MockClient, MockClientFactory, MockFailure, MockProvider};
pub use retry::RetryPolicy;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::backend::context::RequestContext;
use crate::errors::Result;
use crate::secrets::SecretString;

/// Where an API key lives on the provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApiKeyScope {
    /// Key acting as the user that owns the root token
    User,
    /// Key limited to one project
    Project { project_id: String },
}

impl ApiKeyScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Project { .. } => "project",
        }
    }

    /// Path segments of the key collection for this scope.
    pub fn collection_segments(&self) -> Vec<&str> {
        match self {
            Self::User => vec!["user", "api-keys"],
            Self::Project { project_id } => vec!["projects", project_id.as_str(), "api-keys"],
        }
    }

    /// Reject scopes whose project id could not be a Packet identifier.
    pub fn validate(&self) -> std::result::Result<(), String> {
        match self {
            Self::User => Ok(()),
            Self::Project { project_id } => validate_identifier("project_id", project_id),
        }
    }
}

/// Longest identifier accepted as a path segment
const MAX_IDENTIFIER_LEN: usize = 64;

/// Packet ids are UUIDs. Only `[A-Za-z0-9_-]` is accepted so a caller-supplied
/// id can never add, remove or escape path segments.
pub fn validate_identifier(field: &str, value: &str) -> std::result::Result<(), String> {
    if value.is_empty() || value.len() > MAX_IDENTIFIER_LEN {
        return Err(format!("{} must be 1 to {} characters", field, MAX_IDENTIFIER_LEN));
    }
    if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(format!("{} '{}' may only contain letters, digits, '_' and '-'", field, value));
    }
    Ok(())
}

impl fmt::Display for ApiKeyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Project { project_id } => write!(f, "project:{}", project_id),
        }
    }
}

/// Parameters for minting one API key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateApiKeyRequest {
    pub scope: ApiKeyScope,
    pub description: String,
    pub read_only: bool,
    /// Lease TTL the key is issued for. Packet keys have no server-side
    /// expiry, so this is informational for the provider.
    pub ttl: Duration,
}

/// An API key as returned by the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKey {
    pub id: String,
    pub token: SecretString,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Calls the backend makes against the provider.
///
/// Implementations authenticate every call with the root token they were
/// built from and classify failures into the crate [`Error`](crate::Error)
/// taxonomy: a missing key is `CredentialNotFound`.
#[async_trait]
pub trait ProviderApi: Send + Sync + fmt::Debug {
    /// Mint a new API key.
    async fn create_api_key(
        &self,
        ctx: &RequestContext,
        request: &CreateApiKeyRequest,
    ) -> Result<ApiKey>;

    /// Delete an API key by id.
    async fn delete_api_key(&self, ctx: &RequestContext, id: &str) -> Result<()>;

    /// Look an API key up, `None` if the provider no longer has it.
    async fn lookup_api_key(
        &self,
        ctx: &RequestContext,
        scope: &ApiKeyScope,
        id: &str,
    ) -> Result<Option<ApiKey>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_paths() {
        assert_eq!(ApiKeyScope::User.collection_segments(), vec!["user", "api-keys"]);
        let project = ApiKeyScope::Project { project_id: "p-123".to_string() };
        assert_eq!(project.collection_segments(), vec!["projects", "p-123", "api-keys"]);
        assert_eq!(project.to_string(), "project:p-123");
        assert_eq!(project.as_str(), "project");
    }

    #[test]
    fn test_scope_serialization() {
        let json = serde_json::to_value(ApiKeyScope::Project { project_id: "p-1".to_string() })
            .unwrap();
        assert_eq!(json, serde_json::json!({"type": "project", "project_id": "p-1"}));

        let user: ApiKeyScope = serde_json::from_value(serde_json::json!({"type": "user"})).unwrap();
        assert_eq!(user, ApiKeyScope::User);
    }

    #[test]
    fn test_api_key_deserialization() {
        let key: ApiKey = serde_json::from_value(serde_json::json!({
            "id": "key-1",
            "token": "tok",
            "description": "packet-secrets role=readonly ttl=3600s",
            "read_only": true,
            "created_at": "2024-01-02T03:04:05Z",
            "href": "/user/api-keys/key-1"
        }))
        .unwrap();

        assert_eq!(key.id, "key-1");
        assert_eq!(key.token.expose_secret(), "tok");
        assert!(key.read_only);
        assert!(key.created_at.is_some());
    }

    #[test]
    fn test_identifiers_cannot_traverse_paths() {
        assert!(validate_identifier("id", "3f2a9c1e-0b7d-4e55-9a31-6c2f1d8e4b90").is_ok());
        for bad in ["", "..", "../user", "a/b", "a%2Fb", "p 1", "x?y=1", "key#frag"] {
            assert!(validate_identifier("id", bad).is_err(), "accepted {:?}", bad);
        }
        assert!(validate_identifier("id", &"a".repeat(65)).is_err());

        let project = ApiKeyScope::Project { project_id: "../user".to_string() };
        assert!(project.validate().is_err());
        assert!(ApiKeyScope::User.validate().is_ok());
    }
}
