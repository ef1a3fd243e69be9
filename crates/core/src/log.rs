// SPDX-License-Identifier: MIT

//! Leveled log entries and the bounded in-memory ring they live in.

use crate::server::ServerKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;

/// Ring capacity; the oldest entry is evicted beyond this.
pub const MAX_LOG_ENTRIES: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

crate::simple_display! {
    LogLevel {
        Debug => "DEBUG",
        Info => "INFO",
        Warn => "WARN",
        Error => "ERROR",
    }
}

/// One persisted log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// ISO-8601 timestamp.
    pub at: String,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerKey>,
}

/// Bounded ring of log entries.
#[derive(Debug, Clone, Default)]
pub struct LogRing {
    entries: VecDeque<LogEntry>,
    cap: usize,
}

impl LogRing {
    pub fn new() -> Self {
        Self::with_capacity(MAX_LOG_ENTRIES)
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self { entries: VecDeque::with_capacity(cap.min(64)), cap }
    }

    pub fn push(&mut self, entry: LogEntry) {
        while self.entries.len() >= self.cap {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Replace contents from persisted history (keeps the newest `cap`).
    pub fn load(&mut self, entries: Vec<LogEntry>) {
        self.entries.clear();
        for entry in entries {
            self.push(entry);
        }
    }

    /// Snapshot for a flush; the ring keeps its contents.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
