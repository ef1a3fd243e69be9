// SPDX-License-Identifier: MIT

//! Migration from the legacy single-server layout.
//!
//! Early installs stored one config and one run state with no server
//! dimension. On startup, if the registry is absent but legacy records
//! exist, they are copied under the detected server (or `unknown_server`)
//! and the registry is written with a migration marker. Legacy keys are
//! left in place as a backup.

use crate::keys::{config_key, state_key, LEGACY_CONFIG_KEY, LEGACY_STATE_KEY};
use crate::registry::RegistryStore;
use crate::store::{Storage, StorageError};
use reeve_core::{Clock, RegistryEntry, ServerKey};

/// Run the legacy migration pass. Returns the migrated server key, or
/// `None` when there was nothing to migrate.
pub async fn migrate_legacy_layout(
    storage: &Storage,
    detected: Option<ServerKey>,
    clock: &impl Clock,
) -> Result<Option<ServerKey>, StorageError> {
    let registry_store = RegistryStore::new(storage.clone());
    if registry_store.exists().await? {
        return Ok(None);
    }

    let legacy_config = storage.get(LEGACY_CONFIG_KEY).await?;
    let legacy_state = storage.get(LEGACY_STATE_KEY).await?;
    if legacy_config.is_none() && legacy_state.is_none() {
        return Ok(None);
    }

    let server = detected.unwrap_or_else(ServerKey::unknown);
    tracing::info!(server = %server, "migrating legacy single-server records");

    if let Some(config) = legacy_config {
        storage.set(&config_key(&server), config).await?;
    }
    if let Some(state) = legacy_state {
        storage.set(&state_key(&server), state).await?;
    }

    registry_store
        .upsert(
            &server,
            RegistryEntry {
                label: server.to_string(),
                last_used_at_ms: clock.epoch_ms(),
                migrated_from_legacy: true,
            },
        )
        .await?;

    Ok(Some(server))
}

#[cfg(test)]
#[path = "migration_tests.rs"]
mod tests;
