//! Key-based invalidation subscriptions.
//!
//! Components that derive state from a stored record subscribe to its key at
//! backend construction. A write or delete of the record, or a host-driven
//! [`Backend::invalidate`](super::Backend::invalidate), notifies every
//! listener of that key before the triggering call returns.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Something that must drop derived state when a key changes.
#[async_trait]
pub trait InvalidationListener: Send + Sync + fmt::Debug {
    async fn invalidate(&self, key: &str);
}

/// Subscription table, fixed once the backend is assembled.
#[derive(Default)]
pub struct InvalidationHooks {
    listeners: HashMap<String, Vec<Arc<dyn InvalidationListener>>>,
}

impl fmt::Debug for InvalidationHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.listeners.keys().collect();
        keys.sort();
        f.debug_struct("InvalidationHooks").field("keys", &keys).finish()
    }
}

impl InvalidationHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for changes to `key`.
    pub fn subscribe(&mut self, key: impl Into<String>, listener: Arc<dyn InvalidationListener>) {
        self.listeners.entry(key.into()).or_default().push(listener);
    }

    /// Notify all listeners of `key`. Returns how many were notified; unknown
    /// keys are a no-op.
    pub async fn notify(&self, key: &str) -> usize {
        let Some(listeners) = self.listeners.get(key) else {
            debug!(key = %key, "No invalidation listeners for key");
            return 0;
        };

        for listener in listeners {
            listener.invalidate(key).await;
        }

        debug!(key = %key, listeners = listeners.len(), "Invalidation delivered");
        listeners.len()
    }

    pub fn has_listeners(&self, key: &str) -> bool {
        self.listeners.get(key).is_some_and(|l| !l.is_empty())
    }
}
