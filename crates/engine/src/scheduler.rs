// SPDX-License-Identifier: MIT

//! Named periodic cycles with jitter, and named one-shots.
//!
//! The scheduler is a pure timer store polled by the engine's run task:
//! `due(now)` returns the names that fired and re-arms cycles with fresh
//! jitter, so a handler that fails never disarms its cycle. Host sleep
//! destroys nothing here, but the driver task may stall; the heartbeat
//! re-creates missing cycles via `is_scheduled`.

use rand::Rng;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Cycle,
    Once,
}

#[derive(Debug, Clone)]
struct Entry {
    kind: EntryKind,
    base: Duration,
    jitter: Duration,
    next_at: Instant,
}

/// Status of one scheduled cycle, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleStatus {
    pub interval: Duration,
    pub next_at: Instant,
}

/// Jittered cycle scheduler.
#[derive(Debug, Default)]
pub struct Scheduler {
    entries: HashMap<String, Entry>,
    started: bool,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        self.started = true;
    }

    /// Stop firing. Entries survive so `start` resumes them.
    pub fn stop(&mut self) {
        self.started = false;
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Register (or replace) a periodic cycle.
    pub fn schedule_cycle(&mut self, name: &str, base: Duration, jitter: Duration, now: Instant) {
        let next_at = now + jittered(base, jitter);
        self.entries
            .insert(name.to_string(), Entry { kind: EntryKind::Cycle, base, jitter, next_at });
    }

    /// Change a cycle's base interval, keeping its jitter, re-arming from now.
    pub fn reschedule(&mut self, name: &str, new_base: Duration, now: Instant) {
        if let Some(entry) = self.entries.get_mut(name) {
            entry.base = new_base;
            entry.next_at = now + jittered(new_base, entry.jitter);
        }
    }

    /// Register (or replace) a one-shot firing after `delay`.
    pub fn schedule_once(&mut self, name: &str, delay: Duration, now: Instant) {
        self.entries.insert(
            name.to_string(),
            Entry { kind: EntryKind::Once, base: delay, jitter: Duration::ZERO, next_at: now + delay },
        );
    }

    pub fn clear(&mut self, name: &str) {
        self.entries.remove(name);
    }

    pub fn is_scheduled(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Names that fired by `now`. Cycles re-arm with fresh jitter;
    /// one-shots are removed.
    pub fn due(&mut self, now: Instant) -> Vec<String> {
        if !self.started {
            return Vec::new();
        }
        let mut fired: Vec<String> = Vec::new();
        let mut expired: Vec<String> = Vec::new();
        for (name, entry) in &mut self.entries {
            if entry.next_at > now {
                continue;
            }
            fired.push(name.clone());
            match entry.kind {
                EntryKind::Cycle => entry.next_at = now + jittered(entry.base, entry.jitter),
                EntryKind::Once => expired.push(name.clone()),
            }
        }
        for name in expired {
            self.entries.remove(&name);
        }
        // Stable firing order for deterministic handling
        fired.sort();
        fired
    }

    /// The earliest pending deadline, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        if !self.started {
            return None;
        }
        self.entries.values().map(|e| e.next_at).min()
    }

    pub fn status(&self) -> HashMap<String, CycleStatus> {
        self.entries
            .iter()
            .map(|(name, e)| {
                (name.clone(), CycleStatus { interval: e.base, next_at: e.next_at })
            })
            .collect()
    }
}

/// `base` plus a uniform offset in `[-jitter, +jitter]`, floored at zero.
fn jittered(base: Duration, jitter: Duration) -> Duration {
    let jitter_ms = jitter.as_millis() as i64;
    if jitter_ms == 0 {
        return base;
    }
    let offset = rand::thread_rng().gen_range(-jitter_ms..=jitter_ms);
    let next_ms = base.as_millis() as i64 + offset;
    Duration::from_millis(next_ms.max(0) as u64)
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
