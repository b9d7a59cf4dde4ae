//! Root credential configuration.
//!
//! A single [`PacketConfig`] record lives under [`CONFIG_KEY`]. Writes fully
//! replace it. Every successful write or delete fires the `config`
//! invalidation hooks before returning, so the next client build is
//! guaranteed to see the new record.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;
use url::Url;

use super::invalidation::InvalidationHooks;
use crate::errors::{Error, Result};
use crate::secrets::types::serialize_exposed;
use crate::secrets::SecretString;
use crate::storage::{Storage, StorageEntry};

/// Storage key of the configuration record
pub const CONFIG_KEY: &str = "config";

/// Persisted configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PacketConfig {
    /// Long-lived root API token
    #[serde(serialize_with = "serialize_exposed")]
    pub api_token: SecretString,

    /// Override for the provider endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Override for the User-Agent header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl PacketConfig {
    pub fn new(api_token: impl Into<SecretString>) -> Self {
        Self { api_token: api_token.into(), api_url: None, user_agent: None }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = Some(api_url.into());
        self
    }

    /// Parse a write request body. Unknown fields are ignored.
    pub fn from_request(data: &Map<String, Value>) -> Result<Self> {
        let api_token = match data.get("api_token") {
            Some(Value::String(token)) if !token.trim().is_empty() => SecretString::new(token.trim()),
            Some(Value::String(_)) | None => {
                return Err(Error::invalid_request("api_token is required"));
            }
            Some(_) => return Err(Error::invalid_request("api_token must be a string")),
        };

        let config = Self {
            api_token,
            api_url: optional_string(data, "api_url")?,
            user_agent: optional_string(data, "user_agent")?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_token.is_empty() {
            return Err(Error::invalid_request("api_token cannot be empty"));
        }

        if let Some(api_url) = &self.api_url {
            let parsed = Url::parse(api_url)
                .map_err(|e| Error::invalid_request(format!("api_url is not a valid URL: {}", e)))?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(Error::invalid_request("api_url must use http or https"));
            }
        }

        Ok(())
    }

    /// Response body for a config read. The token is reported as set, never echoed.
    pub fn to_response(&self) -> Value {
        serde_json::json!({
            "api_token_set": !self.api_token.is_empty(),
            "api_url": self.api_url,
            "user_agent": self.user_agent,
        })
    }
}

fn optional_string(data: &Map<String, Value>, field: &str) -> Result<Option<String>> {
    match data.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(_) => Err(Error::invalid_request(format!("{} must be a string", field))),
    }
}

/// Read the configuration record without any side effects.
pub async fn load_config(storage: &dyn Storage) -> Result<Option<PacketConfig>> {
    match storage.get(CONFIG_KEY).await? {
        Some(entry) => Ok(Some(entry.decode_json()?)),
        None => Ok(None),
    }
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    storage: Arc<dyn Storage>,
    hooks: Arc<InvalidationHooks>,
}

impl ConfigStore {
    pub fn new(storage: Arc<dyn Storage>, hooks: Arc<InvalidationHooks>) -> Self {
        Self { storage, hooks }
    }

    pub async fn read(&self) -> Result<Option<PacketConfig>> {
        load_config(self.storage.as_ref()).await
    }

    /// Replace the configuration and invalidate dependants.
    pub async fn write(&self, config: &PacketConfig) -> Result<()> {
        config.validate()?;
        self.storage.put(StorageEntry::from_json(CONFIG_KEY, config)?).await?;
        info!(api_url = ?config.api_url, api_token = %config.api_token.hint(), "Configuration written");

        self.hooks.notify(CONFIG_KEY).await;
        Ok(())
    }

    /// Remove the configuration and invalidate dependants.
    pub async fn delete(&self) -> Result<()> {
        self.storage.delete(CONFIG_KEY).await?;
        info!("Configuration deleted");

        self.hooks.notify(CONFIG_KEY).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_from_request_requires_token() {
        let err = PacketConfig::from_request(&as_map(json!({"api_url": "https://x"}))).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest { .. }));

        let err = PacketConfig::from_request(&as_map(json!({"api_token": "  "}))).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest { .. }));

        let err = PacketConfig::from_request(&as_map(json!({"api_token": 42}))).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest { .. }));
    }

    #[test]
    fn test_from_request_rejects_bad_url() {
        let err = PacketConfig::from_request(&as_map(
            json!({"api_token": "T1", "api_url": "ftp://example.com"}),
        ))
        .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest { .. }));
    }

    #[test]
    fn test_stored_form_keeps_token_response_hides_it() {
        let config = PacketConfig::new("T1").with_api_url("https://metal.example.com");

        let stored = serde_json::to_value(&config).unwrap();
        assert_eq!(stored["api_token"], "T1");

        let response = config.to_response();
        assert_eq!(response["api_token_set"], true);
        assert!(response.get("api_token").is_none());
        assert_eq!(response["api_url"], "https://metal.example.com");
    }

    #[tokio::test]
    async fn test_write_fully_replaces() {
        let storage = Arc::new(InMemoryStorage::new());
        let store = ConfigStore::new(storage, Arc::new(InvalidationHooks::new()));

        store.write(&PacketConfig::new("T1").with_api_url("https://a.example.com")).await.unwrap();
        store.write(&PacketConfig::new("T2")).await.unwrap();

        let config = store.read().await.unwrap().unwrap();
        assert_eq!(config.api_token.expose_secret(), "T2");
        assert!(config.api_url.is_none());

        store.delete().await.unwrap();
        assert!(store.read().await.unwrap().is_none());
    }
}
