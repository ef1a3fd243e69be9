// SPDX-License-Identifier: MIT

//! The key/value store with per-key write serialisation.

use crate::backend::{BackendError, StorageBackend};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("backend error for key '{key}': {source}")]
    Backend {
        key: String,
        #[source]
        source: BackendError,
    },
    #[error("serialization error for key '{key}': {source}")]
    Serde {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Mapping from string keys to JSON values with best-effort durability.
///
/// Writers to the same key are serialised through a per-key async mutex,
/// so read-merge-write sequences never lose updates to an interleaved
/// caller. Writers to different keys proceed in parallel. A failed write
/// surfaces its error to the triggering caller only; the key is usable
/// again immediately.
#[derive(Clone)]
pub struct Storage {
    backend: Arc<dyn StorageBackend>,
    locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl Storage {
    pub fn new(backend: impl StorageBackend) -> Self {
        Self { backend: Arc::new(backend), locks: Arc::new(Mutex::new(HashMap::new())) }
    }

    fn key_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        locks.entry(key.to_string()).or_default().clone()
    }

    fn backend_err(key: &str) -> impl FnOnce(BackendError) -> StorageError + '_ {
        move |source| StorageError::Backend { key: key.to_string(), source }
    }

    pub async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        self.backend.load(key).map_err(Self::backend_err(key))
    }

    /// Read a key, falling back to `default` when absent.
    pub async fn get_or(&self, key: &str, default: Value) -> Result<Value, StorageError> {
        Ok(self.get(key).await?.unwrap_or(default))
    }

    pub async fn get_typed<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StorageError> {
        match self.get(key).await? {
            None => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|source| StorageError::Serde { key: key.to_string(), source }),
        }
    }

    pub async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let lock = self.key_lock(key);
        let _guard = lock.lock().await;
        self.backend.store(key, &value).map_err(Self::backend_err(key))
    }

    pub async fn set_typed<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let value = serde_json::to_value(value)
            .map_err(|source| StorageError::Serde { key: key.to_string(), source })?;
        self.set(key, value).await
    }

    pub async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let lock = self.key_lock(key);
        let _guard = lock.lock().await;
        self.backend.remove(key).map_err(Self::backend_err(key))
    }

    pub async fn contains(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.get(key).await?.is_some())
    }

    /// Serialised read-merge-write for one key.
    ///
    /// `merge` is a pure function from the current value (None when the
    /// key is absent) to the value to store. Concurrent callers on the
    /// same key are applied in some serial order; no update is lost.
    pub async fn atomic_merge(
        &self,
        key: &str,
        merge: impl FnOnce(Option<Value>) -> Value,
    ) -> Result<Value, StorageError> {
        let lock = self.key_lock(key);
        let _guard = lock.lock().await;
        let current = self.backend.load(key).map_err(Self::backend_err(key))?;
        let updated = merge(current);
        self.backend.store(key, &updated).map_err(Self::backend_err(key))?;
        Ok(updated)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
