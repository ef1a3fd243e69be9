// SPDX-License-Identifier: MIT

//! Run counters carried by each engine and persisted with its state.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotStats {
    pub cycles: u64,
    pub scans: u64,
    pub scan_failures: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub hero_claims: u64,
    pub last_cycle_at_ms: u64,
}
