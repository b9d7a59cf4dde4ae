//! In-memory [`Storage`] backed by a concurrent map.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use super::{Storage, StorageEntry};
use crate::errors::Result;

/// Process-local storage. Nothing survives a restart.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    entries: Arc<DashMap<String, Vec<u8>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<StorageEntry>> {
        Ok(self
            .entries
            .get(key)
            .map(|value| StorageEntry { key: key.to_string(), value: value.clone() }))
    }

    async fn put(&self, entry: StorageEntry) -> Result<()> {
        self.entries.insert(entry.key, entry.value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter_map(|item| item.key().strip_prefix(prefix).map(str::to_string))
            .filter(|rest| !rest.is_empty() && !rest.contains('/'))
            .collect();
        keys.sort();
        Ok(keys)
    }
}
