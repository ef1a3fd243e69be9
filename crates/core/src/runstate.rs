// SPDX-License-Identifier: MIT

//! Persisted per-server run state and the emergency-stop record.

use crate::stats::BotStats;
use crate::task::Task;
use serde::{Deserialize, Serialize};

/// Everything an engine needs to resume mid-stream after a host restart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedRunState {
    pub stats: BotStats,
    pub tasks: Vec<Task>,
    pub actions_this_hour: u32,
    pub hour_reset_at_ms: u64,
    pub last_farm_at_ms: u64,
    /// The resurrection signal: the engine was running when this was saved.
    pub was_running: bool,
    pub saved_at_ms: u64,
}

/// Why and when the engine last emergency-stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyRecord {
    pub reason: String,
    pub at_ms: u64,
}

impl EmergencyRecord {
    /// Persisted reasons are preferred over in-memory state for this long.
    pub const FRESH_WINDOW_MS: u64 = 3_600_000;

    pub fn is_fresh(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.at_ms) < Self::FRESH_WINDOW_MS
    }
}
