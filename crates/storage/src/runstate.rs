// SPDX-License-Identifier: MIT

//! Run-state and emergency-record persistence.

use crate::keys::{state_key, EMERGENCY_KEY, LEGACY_STATE_KEY};
use crate::store::{Storage, StorageError};
use reeve_core::{EmergencyRecord, PersistedRunState, ServerKey};
use serde_json::Value;

#[derive(Clone)]
pub struct RunStateStore {
    storage: Storage,
}

impl RunStateStore {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub async fn load(&self, server: &ServerKey) -> Result<Option<PersistedRunState>, StorageError> {
        self.storage.get_typed(&state_key(server)).await
    }

    pub async fn save(
        &self,
        server: &ServerKey,
        state: &PersistedRunState,
    ) -> Result<(), StorageError> {
        self.storage.set_typed(&state_key(server), state).await
    }

    pub async fn load_legacy(&self) -> Result<Option<Value>, StorageError> {
        self.storage.get(LEGACY_STATE_KEY).await
    }

    pub async fn save_emergency(&self, record: &EmergencyRecord) -> Result<(), StorageError> {
        self.storage.set_typed(EMERGENCY_KEY, record).await
    }

    /// The persisted emergency reason, when newer than the freshness window.
    ///
    /// Preferred over the in-memory reason after a host restart.
    pub async fn fresh_emergency(&self, now_ms: u64) -> Result<Option<EmergencyRecord>, StorageError> {
        let record: Option<EmergencyRecord> = self.storage.get_typed(EMERGENCY_KEY).await?;
        Ok(record.filter(|r| r.is_fresh(now_ms)))
    }

    pub async fn clear_emergency(&self) -> Result<(), StorageError> {
        self.storage.remove(EMERGENCY_KEY).await
    }
}

#[cfg(test)]
#[path = "runstate_tests.rs"]
mod tests;
