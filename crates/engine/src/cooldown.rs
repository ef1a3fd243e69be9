// SPDX-License-Identifier: MIT

//! Expiring cooldowns keyed by a task's dedup key.
//!
//! Cooldowns gate enqueueing: a strategy proposal whose key is still
//! cooling is dropped before it reaches the queue.

use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct CooldownMap {
    until_ms: HashMap<String, u64>,
}

impl CooldownMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, duration: Duration, now_ms: u64) {
        self.until_ms.insert(key.into(), now_ms + duration.as_millis() as u64);
    }

    pub fn is_active(&self, key: &str, now_ms: u64) -> bool {
        self.until_ms.get(key).map(|&until| until > now_ms).unwrap_or(false)
    }

    pub fn remaining(&self, key: &str, now_ms: u64) -> Option<Duration> {
        let until = *self.until_ms.get(key)?;
        (until > now_ms).then(|| Duration::from_millis(until - now_ms))
    }

    /// Drop expired entries so the map stays bounded.
    pub fn purge(&mut self, now_ms: u64) {
        self.until_ms.retain(|_, &mut until| until > now_ms);
    }

    pub fn active_keys(&self, now_ms: u64) -> Vec<&str> {
        self.until_ms
            .iter()
            .filter(|(_, &until)| until > now_ms)
            .map(|(k, _)| k.as_str())
            .collect()
    }
}

#[cfg(test)]
#[path = "cooldown_tests.rs"]
mod tests;
