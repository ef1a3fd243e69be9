// SPDX-License-Identifier: MIT

//! Start/stop/heartbeat and the persistence protocol.

use super::{BotEngine, EngineError, HOURLY_RESET, MAIN_LOOP, PERSIST_STATE};
use crate::strategy::Strategy;
use crate::transport::PageTransport;
use reeve_core::{BotState, Clock, EmergencyRecord, PersistedRunState};
use std::time::Duration;

const HOUR_MS: u64 = 3_600_000;
const HOURLY_RESET_INTERVAL: Duration = Duration::from_secs(3600);
const PERSIST_INTERVAL: Duration = Duration::from_secs(60);
const PERSIST_JITTER: Duration = Duration::from_secs(5);

impl<T, S, C> BotEngine<T, S, C>
where
    T: PageTransport,
    S: Strategy,
    C: Clock,
{
    /// Start the engine: load config and run state, restore mid-stream
    /// progress, arm cycles. A latched emergency is cleared here; an
    /// explicit start is the operator's acknowledgement.
    pub async fn start(&self) -> Result<(), EngineError> {
        if self.running() {
            return Err(EngineError::AlreadyRunning);
        }
        self.logger.set_server(Some(self.server.clone()));
        self.with_state(|s| {
            s.emergency_latched = false;
            s.emergency_reason = None;
        });

        let config = self.config_store.load(&self.server).await?;
        let run = self.run_store.load(&self.server).await?;
        let now_ms = self.clock.epoch_ms();
        self.with_state(|s| {
            s.config = config;
            s.hour_reset_at_ms = now_ms;
            if let Some(run) = run {
                s.stats = run.stats;
                s.queue.restore(run.tasks);
                s.last_farm_at_ms = run.last_farm_at_ms;
                // The rate counter survives a restart only within its hour
                if now_ms.saturating_sub(run.hour_reset_at_ms) < HOUR_MS {
                    s.actions_this_hour = run.actions_this_hour;
                    s.hour_reset_at_ms = run.hour_reset_at_ms;
                } else {
                    s.actions_this_hour = 0;
                }
            }
        });

        self.transition(BotState::Idle);
        self.arm_cycles();
        self.scheduler.lock().start();
        self.save_state().await?;
        self.logger.info("bot started", None);
        Ok(())
    }

    /// Stop the engine: cancel cycles, persist, flush.
    pub async fn stop(&self) -> Result<(), EngineError> {
        self.scheduler.lock().stop();
        self.cancel_driver();
        self.transition(BotState::Stopped);
        self.logger.info("bot stopped", None);
        self.save_state().await?;
        if let Err(err) = self.logger.flush().await {
            tracing::warn!(server = %self.server, error = %err, "log flush on stop failed");
        }
        Ok(())
    }

    /// Wake-up poke from the per-server platform alarm.
    ///
    /// Recreates the main loop (and the hourly reset alongside it) when
    /// host sleep destroyed the timers, then runs a tick.
    pub async fn heartbeat(&self) {
        if !self.running() || self.emergency_stopped() {
            return;
        }
        let main_missing = !self.scheduler.lock().is_scheduled(MAIN_LOOP);
        if main_missing {
            self.logger.warn("heartbeat found main loop missing; resurrecting cycles", None);
            let (base, jitter) = self.main_loop_intervals();
            let now = self.clock.now();
            let mut scheduler = self.scheduler.lock();
            scheduler.schedule_cycle(MAIN_LOOP, base, jitter, now);
            if !scheduler.is_scheduled(HOURLY_RESET) {
                scheduler.schedule_cycle(HOURLY_RESET, HOURLY_RESET_INTERVAL, Duration::ZERO, now);
            }
            scheduler.start();
        }
        self.tick_main_loop().await;
    }

    /// Hard stop with a recorded reason. Latches `emergency_stopped`,
    /// persists the reason, and tells the page best-effort.
    pub async fn emergency_stop(&self, reason: &str) {
        let now_ms = self.clock.epoch_ms();
        self.logger.error(format!("EMERGENCY STOP: {reason}"), None);
        self.with_state(|s| {
            s.emergency_reason = Some(reason.to_string());
            s.emergency_latched = true;
        });
        self.transition(BotState::Emergency);
        if let Err(err) = self.logger.flush().await {
            tracing::warn!(server = %self.server, error = %err, "emergency log flush failed");
        }
        if let Err(err) = self
            .run_store
            .save_emergency(&EmergencyRecord { reason: reason.to_string(), at_ms: now_ms })
            .await
        {
            tracing::warn!(server = %self.server, error = %err, "emergency record save failed");
        }

        self.scheduler.lock().stop();
        self.cancel_driver();
        self.transition(BotState::Stopped);
        if let Err(err) = self.save_state().await {
            tracing::warn!(server = %self.server, error = %err, "state save on emergency failed");
        }
        if let Some(tab) = self.tab() {
            self.bridge.notify(tab, "emergency", reason).await;
        }
    }

    /// The emergency reason to show the operator, preferring a fresh
    /// persisted record over in-memory state (survives host restarts).
    pub async fn emergency_reason(&self) -> Option<String> {
        let now_ms = self.clock.epoch_ms();
        if let Ok(Some(record)) = self.run_store.fresh_emergency(now_ms).await {
            return Some(record.reason);
        }
        self.with_state(|s| s.emergency_reason.clone())
    }

    /// Persist the run state. Clears the queue's dirty bit only when no
    /// mutation slipped in between snapshot and commit, so a racing
    /// mutation is picked up by the next save window.
    pub async fn save_state(&self) -> Result<(), EngineError> {
        let (snapshot, dirty_mark) = self.with_state(|s| {
            let snapshot = PersistedRunState {
                stats: s.stats,
                tasks: s.queue.get_all().to_vec(),
                actions_this_hour: s.actions_this_hour,
                hour_reset_at_ms: s.hour_reset_at_ms,
                last_farm_at_ms: s.last_farm_at_ms,
                was_running: s.fsm.is_running(),
                saved_at_ms: self.clock.epoch_ms(),
            };
            (snapshot, s.queue.dirty_at())
        });
        self.run_store.save(&self.server, &snapshot).await?;
        self.with_state(|s| {
            if s.queue.dirty_at() == dirty_mark {
                s.queue.mark_clean();
            }
        });
        Ok(())
    }

    /// Reset the rolling hour window when it has elapsed.
    pub(crate) fn reset_rate_window(&self) {
        let now_ms = self.clock.epoch_ms();
        self.with_state(|s| super::cycle::roll_rate_window(s, now_ms));
    }

    pub(super) fn main_loop_intervals(&self) -> (Duration, Duration) {
        self.with_state(|s| {
            let base = Duration::from_secs(s.config.delays.cycle_base_secs);
            let jitter = base * s.config.delays.cycle_jitter_pct / 100;
            (base, jitter)
        })
    }

    fn arm_cycles(&self) {
        let (base, jitter) = self.main_loop_intervals();
        let now = self.clock.now();
        let mut scheduler = self.scheduler.lock();
        scheduler.schedule_cycle(MAIN_LOOP, base, jitter, now);
        scheduler.schedule_cycle(HOURLY_RESET, HOURLY_RESET_INTERVAL, Duration::ZERO, now);
        scheduler.schedule_cycle(PERSIST_STATE, PERSIST_INTERVAL, PERSIST_JITTER, now);
    }
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
