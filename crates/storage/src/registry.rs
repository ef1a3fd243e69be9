// SPDX-License-Identifier: MIT

//! Server registry persistence.

use crate::keys::REGISTRY_KEY;
use crate::store::{Storage, StorageError};
use reeve_core::{RegistryEntry, ServerKey, ServerRegistry};
use serde_json::Value;

#[derive(Clone)]
pub struct RegistryStore {
    storage: Storage,
}

impl RegistryStore {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub async fn load(&self) -> Result<ServerRegistry, StorageError> {
        Ok(self.storage.get_typed(REGISTRY_KEY).await?.unwrap_or_default())
    }

    pub async fn exists(&self) -> Result<bool, StorageError> {
        self.storage.contains(REGISTRY_KEY).await
    }

    pub async fn save(&self, registry: &ServerRegistry) -> Result<(), StorageError> {
        self.storage.set_typed(REGISTRY_KEY, registry).await
    }

    /// Insert or replace one entry without clobbering concurrent writers.
    pub async fn upsert(&self, server: &ServerKey, entry: RegistryEntry) -> Result<(), StorageError> {
        let server = server.clone();
        self.storage
            .atomic_merge(REGISTRY_KEY, move |current| {
                let mut registry: ServerRegistry = current
                    .and_then(|v| serde_json::from_value(v).ok())
                    .unwrap_or_default();
                registry.servers.insert(server, entry);
                serde_json::to_value(&registry).unwrap_or(Value::Null)
            })
            .await?;
        Ok(())
    }
}
