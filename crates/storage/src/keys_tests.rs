// SPDX-License-Identifier: MIT

use super::*;

#[yare::parameterized(
    config = { config_key, "bot_config__ts1.example.com" },
    state  = { state_key, "bot_state__ts1.example.com" },
    logs   = { logs_key, "bot_logs__ts1.example.com" },
)]
fn per_server_keys_extend_legacy_names(key_fn: fn(&ServerKey) -> String, expected: &str) {
    let server = ServerKey::new("ts1.example.com");
    assert_eq!(key_fn(&server), expected);
}

#[test]
fn fixed_keys() {
    assert_eq!(REGISTRY_KEY, "bot_config_registry");
    assert_eq!(EMERGENCY_KEY, "bot_emergency_stop");
    assert_eq!(LEGACY_CONFIG_KEY, "bot_config");
    assert_eq!(LEGACY_STATE_KEY, "bot_state");
    assert_eq!(LEGACY_LOGS_KEY, "bot_logs");
}
