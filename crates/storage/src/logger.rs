// SPDX-License-Identifier: MIT

//! The bot logger: a leveled ring buffer mirrored to `tracing` and
//! flushed to storage.
//!
//! The ring is the source of truth for the persisted slices, so history
//! must be loaded before the first flush or it would be clobbered by a
//! near-empty buffer. Flush writes the legacy key plus one slice per
//! server tag seen in the ring.

use crate::keys::{logs_key, LEGACY_LOGS_KEY};
use crate::store::{Storage, StorageError};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reeve_core::{Clock, LogEntry, LogLevel, LogRing, ServerKey};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// How often the daemon flushes the ring to storage.
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(30);

struct LoggerInner {
    ring: LogRing,
    current_server: Option<ServerKey>,
    history_loaded: bool,
}

/// Process-wide leveled logger with per-server tagging.
#[derive(Clone)]
pub struct BotLogger<C: Clock> {
    inner: Arc<Mutex<LoggerInner>>,
    storage: Storage,
    clock: C,
}

impl<C: Clock> BotLogger<C> {
    pub fn new(storage: Storage, clock: C) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LoggerInner {
                ring: LogRing::new(),
                current_server: None,
                history_loaded: false,
            })),
            storage,
            clock,
        }
    }

    /// Tag subsequent entries with this server. Engines set this before
    /// any per-server work.
    pub fn set_server(&self, server: Option<ServerKey>) {
        self.inner.lock().current_server = server;
    }

    pub fn debug(&self, message: impl Into<String>, data: Option<Value>) {
        self.log(LogLevel::Debug, message.into(), data);
    }

    pub fn info(&self, message: impl Into<String>, data: Option<Value>) {
        self.log(LogLevel::Info, message.into(), data);
    }

    pub fn warn(&self, message: impl Into<String>, data: Option<Value>) {
        self.log(LogLevel::Warn, message.into(), data);
    }

    pub fn error(&self, message: impl Into<String>, data: Option<Value>) {
        self.log(LogLevel::Error, message.into(), data);
    }

    fn log(&self, level: LogLevel, message: String, data: Option<Value>) {
        let mut inner = self.inner.lock();
        let server = inner.current_server.clone();
        let tag = server.as_ref().map(|s| s.to_string()).unwrap_or_default();
        match level {
            LogLevel::Debug => tracing::debug!(server = %tag, "{message}"),
            LogLevel::Info => tracing::info!(server = %tag, "{message}"),
            LogLevel::Warn => tracing::warn!(server = %tag, "{message}"),
            LogLevel::Error => tracing::error!(server = %tag, "{message}"),
        }
        inner.ring.push(LogEntry { at: self.now_iso(), level, message, data, server });
    }

    fn now_iso(&self) -> String {
        DateTime::<Utc>::from_timestamp_millis(self.clock.epoch_ms() as i64)
            .unwrap_or_else(Utc::now)
            .to_rfc3339()
    }

    /// Load the legacy ring from storage. Must run before the first flush.
    pub async fn load_history(&self) -> Result<(), StorageError> {
        let entries: Option<Vec<LogEntry>> = self.storage.get_typed(LEGACY_LOGS_KEY).await?;
        let mut inner = self.inner.lock();
        if inner.history_loaded {
            return Ok(());
        }
        if let Some(mut entries) = entries {
            // Keep anything logged before the load on top of history
            entries.extend(inner.ring.snapshot());
            inner.ring.load(entries);
        }
        inner.history_loaded = true;
        Ok(())
    }

    /// Flush the ring to the legacy key and per-server slices.
    ///
    /// Best-effort: the ring keeps its contents either way, so a failed
    /// flush is retried wholesale on the next one.
    pub async fn flush(&self) -> Result<(), StorageError> {
        let snapshot = {
            let inner = self.inner.lock();
            if !inner.history_loaded {
                tracing::warn!("log flush before history load; skipping to protect history");
                return Ok(());
            }
            inner.ring.snapshot()
        };
        if snapshot.is_empty() {
            return Ok(());
        }

        self.storage.set_typed(LEGACY_LOGS_KEY, &snapshot).await?;

        let mut by_server: BTreeMap<ServerKey, Vec<&LogEntry>> = BTreeMap::new();
        for entry in &snapshot {
            if let Some(server) = &entry.server {
                by_server.entry(server.clone()).or_default().push(entry);
            }
        }
        for (server, entries) in by_server {
            self.storage.set_typed(&logs_key(&server), &entries).await?;
        }
        Ok(())
    }

    /// Entries currently in the ring, optionally filtered by server.
    pub fn entries(&self, server: Option<&ServerKey>) -> Vec<LogEntry> {
        let inner = self.inner.lock();
        inner
            .ring
            .iter()
            .filter(|e| server.map(|s| e.server.as_ref() == Some(s)).unwrap_or(true))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
#[path = "logger_tests.rs"]
mod tests;
