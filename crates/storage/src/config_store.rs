// SPDX-License-Identifier: MIT

//! Config persistence: template-merged loads, registry-touching saves.

use crate::keys::{config_key, LEGACY_CONFIG_KEY, REGISTRY_KEY};
use crate::store::{Storage, StorageError};
use reeve_core::{BotConfig, Clock, ServerKey, ServerRegistry};
use serde_json::Value;

/// Loads and saves per-server configs.
#[derive(Clone)]
pub struct ConfigStore {
    storage: Storage,
}

impl ConfigStore {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Load a server's config, merged over the default template so fields
    /// added since the record was written become visible.
    pub async fn load(&self, server: &ServerKey) -> Result<BotConfig, StorageError> {
        let stored = self.storage.get(&config_key(server)).await?;
        Ok(match stored {
            Some(value) => BotConfig::from_stored(value),
            None => BotConfig::default(),
        })
    }

    /// Load the legacy single-server config if one exists.
    pub async fn load_legacy(&self) -> Result<Option<Value>, StorageError> {
        self.storage.get(LEGACY_CONFIG_KEY).await
    }

    /// Save a server's config and touch the registry's `last_used_at`.
    ///
    /// The registry update goes through `atomic_merge` so a concurrent
    /// save from another engine (or the operator UI) is never lost.
    pub async fn save(
        &self,
        server: &ServerKey,
        config: &BotConfig,
        clock: &impl Clock,
    ) -> Result<(), StorageError> {
        self.storage.set_typed(&config_key(server), config).await?;

        let now_ms = clock.epoch_ms();
        let server = server.clone();
        self.storage
            .atomic_merge(REGISTRY_KEY, move |current| {
                let mut registry: ServerRegistry = current
                    .and_then(|v| serde_json::from_value(v).ok())
                    .unwrap_or_default();
                registry.touch(&server, now_ms);
                serde_json::to_value(&registry).unwrap_or(Value::Null)
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_store_tests.rs"]
mod tests;
