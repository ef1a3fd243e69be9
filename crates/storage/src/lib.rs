// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! reeve-storage: namespaced persistence for the Reeve supervisor.
//!
//! Everything the daemon remembers across restarts goes through [`Storage`]:
//! per-server config and run state, the server registry, log slices, and
//! the emergency-stop marker. Writes to a single key are serialised by a
//! per-key chain; distinct keys proceed in parallel.

mod backend;
mod config_store;
mod keys;
mod logger;
mod migration;
mod registry;
mod runstate;
mod store;

pub use backend::{FileBackend, MemoryBackend, StorageBackend};
pub use config_store::ConfigStore;
pub use keys::{
    config_key, logs_key, state_key, EMERGENCY_KEY, LEGACY_CONFIG_KEY, LEGACY_LOGS_KEY,
    LEGACY_STATE_KEY, REGISTRY_KEY,
};
pub use logger::{BotLogger, FLUSH_INTERVAL};
pub use migration::migrate_legacy_layout;
pub use registry::RegistryStore;
pub use runstate::RunStateStore;
pub use store::{Storage, StorageError};
