//! # Storage and Persistence
//!
//! The host controller owns durable, encrypted storage. This module defines the
//! narrow interface the backend needs from it (get/put/delete/list of opaque
//! JSON entries keyed by path) plus an in-memory implementation used by the
//! standalone host shim and by tests.

pub mod memory;

pub use memory::InMemoryStorage;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::Result;

/// A single stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEntry {
    pub key: String,
    pub value: Vec<u8>,
}

impl StorageEntry {
    /// Encode `value` as JSON under `key`.
    pub fn from_json<T: Serialize>(key: impl Into<String>, value: &T) -> Result<Self> {
        Ok(Self { key: key.into(), value: serde_json::to_vec(value)? })
    }

    /// Decode the stored bytes as JSON.
    pub fn decode_json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.value)?)
    }
}

/// Host-provided persistence.
///
/// Implementations must be safe for concurrent use; the backend adds no
/// locking of its own around storage calls.
#[async_trait]
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Fetch an entry, `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<StorageEntry>>;

    /// Insert or fully replace an entry.
    async fn put(&self, entry: StorageEntry) -> Result<()>;

    /// Remove an entry. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    /// List the keys directly under `prefix`, with the prefix stripped.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}
