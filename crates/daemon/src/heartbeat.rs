// SPDX-License-Identifier: MIT

//! Per-server wake-up alarms.
//!
//! One alarm per running server, named `botHeartbeat__<serverKey>`,
//! firing roughly once a minute. The bare legacy name `botHeartbeat` is
//! still accepted and resolves to the first running instance.

use parking_lot::Mutex;
use reeve_core::ServerKey;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const ALARM_PREFIX: &str = "botHeartbeat__";
const LEGACY_ALARM: &str = "botHeartbeat";

/// Alarm firing interval.
pub const HEARTBEAT_PERIOD: Duration = Duration::from_secs(60);

pub fn alarm_name(server: &ServerKey) -> String {
    format!("{ALARM_PREFIX}{server}")
}

/// Who an alarm belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmTarget {
    Server(ServerKey),
    /// Pre-multi-server alarm name with no server attached.
    Legacy,
}

pub fn parse_alarm(name: &str) -> Option<AlarmTarget> {
    if let Some(server) = name.strip_prefix(ALARM_PREFIX) {
        if server.is_empty() {
            return None;
        }
        return Some(AlarmTarget::Server(ServerKey::new(server)));
    }
    (name == LEGACY_ALARM).then_some(AlarmTarget::Legacy)
}

/// The set of live alarm tasks, one per started server.
pub struct HeartbeatSet {
    alarms_tx: mpsc::Sender<String>,
    tasks: Mutex<HashMap<ServerKey, CancellationToken>>,
}

impl HeartbeatSet {
    pub fn new(alarms_tx: mpsc::Sender<String>) -> Self {
        Self { alarms_tx, tasks: Mutex::new(HashMap::new()) }
    }

    /// Arm (or re-arm) the alarm for one server.
    pub fn start(&self, server: ServerKey, name: String, cancel: CancellationToken) {
        let mut tasks = self.tasks.lock();
        if let Some(old) = tasks.insert(server, cancel.clone()) {
            old.cancel();
        }
        let tx = self.alarms_tx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(HEARTBEAT_PERIOD) => {}
                }
                if tx.send(name.clone()).await.is_err() {
                    return;
                }
            }
        });
    }

    pub fn stop(&self, server: &ServerKey) {
        if let Some(cancel) = self.tasks.lock().remove(server) {
            cancel.cancel();
        }
    }

    pub fn stop_all(&self) {
        for (_, cancel) in self.tasks.lock().drain() {
            cancel.cancel();
        }
    }

    pub fn is_armed(&self, server: &ServerKey) -> bool {
        self.tasks.lock().contains_key(server)
    }
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;
