// SPDX-License-Identifier: MIT

//! Per-server bot configuration.
//!
//! Stored records may predate the current schema, so loading merges the
//! default template with the stored object: one shallow pass, then each
//! named subtree (troop, farm, delays, safety, villages) merged on its own
//! so newly introduced defaults become visible inside old records.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Subtrees that get their own merge pass on load.
const MERGED_SUBTREES: [&str; 5] = ["troop", "farm", "delays", "safety", "villages"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    #[serde(deserialize_with = "lenient_bool")]
    pub enabled: bool,
    #[serde(deserialize_with = "lenient_bool")]
    pub auto_upgrade_resources: bool,
    #[serde(deserialize_with = "lenient_bool")]
    pub auto_upgrade_buildings: bool,
    #[serde(deserialize_with = "lenient_bool")]
    pub auto_build: bool,
    #[serde(deserialize_with = "lenient_u32")]
    pub max_actions_per_hour: u32,
    pub troop: TroopConfig,
    pub farm: FarmConfig,
    pub delays: DelayConfig,
    pub safety: SafetyConfig,
    pub villages: VillageConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            auto_upgrade_resources: true,
            auto_upgrade_buildings: false,
            auto_build: false,
            max_actions_per_hour: 60,
            troop: TroopConfig::default(),
            farm: FarmConfig::default(),
            delays: DelayConfig::default(),
            safety: SafetyConfig::default(),
            villages: VillageConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TroopConfig {
    #[serde(deserialize_with = "lenient_bool")]
    pub auto_train: bool,
    pub building_type: String,
    #[serde(deserialize_with = "lenient_u32")]
    pub batch_size: u32,
}

impl Default for TroopConfig {
    fn default() -> Self {
        Self { auto_train: false, building_type: "barracks".to_string(), batch_size: 5 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FarmConfig {
    #[serde(deserialize_with = "lenient_bool")]
    pub auto_send: bool,
    #[serde(deserialize_with = "lenient_u64")]
    pub interval_secs: u64,
    #[serde(deserialize_with = "lenient_bool")]
    pub selective: bool,
    /// Opaque pass-through for the farm-list API `X-Version` header.
    pub api_version: Option<String>,
}

impl Default for FarmConfig {
    fn default() -> Self {
        Self { auto_send: false, interval_secs: 1800, selective: false, api_version: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayConfig {
    /// Base main-loop interval while work is available.
    #[serde(deserialize_with = "lenient_u64")]
    pub cycle_base_secs: u64,
    /// Jitter applied to the main loop, percent of the base.
    #[serde(deserialize_with = "lenient_u32")]
    pub cycle_jitter_pct: u32,
    /// Main-loop interval when the queue is empty.
    #[serde(deserialize_with = "lenient_u64")]
    pub idle_secs: u64,
    /// Human-like delay range between in-page actions.
    #[serde(deserialize_with = "lenient_u64")]
    pub action_min_ms: u64,
    #[serde(deserialize_with = "lenient_u64")]
    pub action_max_ms: u64,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            cycle_base_secs: 45,
            cycle_jitter_pct: 20,
            idle_secs: 120,
            action_min_ms: 800,
            action_max_ms: 2600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Scan/task failures before the circuit breaker trips.
    #[serde(deserialize_with = "lenient_u32")]
    pub max_consecutive_failures: u32,
    /// Breaker trips before emergency stop.
    #[serde(deserialize_with = "lenient_u32")]
    pub max_breaker_trips: u32,
    /// Base pause after a breaker trip; doubles per trip.
    #[serde(deserialize_with = "lenient_u64")]
    pub pause_base_secs: u64,
    /// Consecutive logged-out scans before emergency stop.
    #[serde(deserialize_with = "lenient_u32")]
    pub max_not_logged_in: u32,
    #[serde(deserialize_with = "lenient_bool")]
    pub hero_resource_claim: bool,
    /// Proactive claim trigger: any resource below this percent of storage.
    #[serde(deserialize_with = "lenient_u32")]
    pub hero_low_pct: u32,
    /// Proactive claim fill target, percent of storage.
    #[serde(deserialize_with = "lenient_u32")]
    pub hero_fill_pct: u32,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 5,
            max_breaker_trips: 3,
            pause_base_secs: 300,
            max_not_logged_in: 5,
            hero_resource_claim: true,
            hero_low_pct: 20,
            hero_fill_pct: 50,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VillageConfig {
    #[serde(deserialize_with = "lenient_bool")]
    pub auto_switch: bool,
    /// Per-village priority overrides keyed by village id.
    pub priorities: HashMap<String, u8>,
}

impl BotConfig {
    /// Build a config from a stored JSON record.
    ///
    /// Merges the default template under the stored value (shallow, then
    /// per-subtree), then deserializes with lenient coercion. A record
    /// that still fails to parse falls back to the template.
    pub fn from_stored(stored: Value) -> Self {
        let merged = Self::merge_with_defaults(stored);
        serde_json::from_value(merged).unwrap_or_default()
    }

    /// Merge a stored JSON object over the default template.
    pub fn merge_with_defaults(stored: Value) -> Value {
        let mut base = match serde_json::to_value(BotConfig::default()) {
            Ok(v) => v,
            Err(_) => return stored,
        };
        let Value::Object(stored) = stored else {
            return base;
        };
        let Some(base_map) = base.as_object_mut() else {
            return Value::Object(stored);
        };
        for (key, value) in stored {
            if MERGED_SUBTREES.contains(&key.as_str()) {
                match (base_map.get_mut(&key), value) {
                    // Subtree merge: keep template fields the record lacks
                    (Some(Value::Object(tpl)), Value::Object(rec)) => {
                        for (k, v) in rec {
                            tpl.insert(k, v);
                        }
                    }
                    // Record subtree is not an object: keep the template
                    _ => {}
                }
            } else {
                base_map.insert(key, value);
            }
        }
        base
    }
}

fn lenient_bool<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_i64().unwrap_or(0) != 0,
        Value::String(s) => matches!(s.as_str(), "true" | "1" | "yes" | "on"),
        _ => false,
    })
}

fn lenient_u32<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    Ok(lenient_number(Value::deserialize(d)?) as u32)
}

fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    Ok(lenient_number(Value::deserialize(d)?))
}

fn lenient_number(value: Value) -> u64 {
    match value {
        Value::Number(n) => {
            n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)).unwrap_or(0)
        }
        Value::String(s) => s.trim().parse().unwrap_or(0),
        Value::Bool(true) => 1,
        _ => 0,
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
