// SPDX-License-Identifier: MIT

//! The persisted key layout.
//!
//! Per-server slices append `__<serverKey>` to the legacy names so a
//! single-server install and a multi-server install share one namespace.

use reeve_core::ServerKey;

/// Legacy single-server config (pre-registry layout).
pub const LEGACY_CONFIG_KEY: &str = "bot_config";
/// Legacy single-server run state.
pub const LEGACY_STATE_KEY: &str = "bot_state";
/// Legacy log ring.
pub const LEGACY_LOGS_KEY: &str = "bot_logs";
/// The server registry record.
pub const REGISTRY_KEY: &str = "bot_config_registry";
/// Emergency-stop marker.
pub const EMERGENCY_KEY: &str = "bot_emergency_stop";

pub fn config_key(server: &ServerKey) -> String {
    format!("{}__{}", LEGACY_CONFIG_KEY, server)
}

pub fn state_key(server: &ServerKey) -> String {
    format!("{}__{}", LEGACY_STATE_KEY, server)
}

pub fn logs_key(server: &ServerKey) -> String {
    format!("{}__{}", LEGACY_LOGS_KEY, server)
}

#[cfg(test)]
#[path = "keys_tests.rs"]
mod tests;
