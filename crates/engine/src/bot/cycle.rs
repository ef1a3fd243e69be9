// SPDX-License-Identifier: MIT

//! The main loop: one scan → decide → execute → return trajectory.
//!
//! Entry is gated by the FSM and the cycle lock; everything inside runs
//! with the cycle lock held. The state mutex itself is released around
//! every await. The unwind path always returns the FSM to Idle, releases
//! the lock, flushes logs, and persists a dirty queue.

use super::{BotEngine, EngineState, BUILDING_REFRESH_CYCLES, MAIN_LOOP};
use crate::strategy::Strategy;
use crate::transport::{PageTransport, TabId};
use reeve_core::{task::cooldown_key_for, BotState, Clock, CyclePhase, GameState, TaskKind};
use serde_json::{json, Value};
use std::time::Duration;

const HOUR_MS: u64 = 3_600_000;

enum Gate {
    Go { cycle: u64, tab: TabId },
    Busy,
    NotRunning,
    NoTab,
}

impl<T, S, C> BotEngine<T, S, C>
where
    T: PageTransport,
    S: Strategy,
    C: Clock,
{
    /// One tick of the main loop. Safe to call from concurrent timers and
    /// heartbeats: only the caller that claims the cycle lock proceeds.
    pub async fn tick_main_loop(&self) {
        let gate = self.with_state(|s| {
            if !s.fsm.is_running() || s.fsm == BotState::Paused {
                return Gate::NotRunning;
            }
            if s.cycle_lock.is_some() {
                return Gate::Busy;
            }
            let Some(tab) = s.tab else {
                return Gate::NoTab;
            };
            s.cycle_lock = Some(CyclePhase::Scanning);
            s.cycle_counter += 1;
            s.stats.last_cycle_at_ms = self.clock.epoch_ms();
            Gate::Go { cycle: s.cycle_counter, tab }
        });
        let (cycle, tab) = match gate {
            Gate::Go { cycle, tab } => (cycle, tab),
            Gate::Busy => {
                tracing::debug!(server = %self.server, "cycle already in flight; tick skipped");
                return;
            }
            Gate::NotRunning => return,
            Gate::NoTab => {
                tracing::warn!(server = %self.server, "tick with no bound tab");
                return;
            }
        };

        self.logger.set_server(Some(self.server.clone()));
        self.with_state(|s| s.stats.cycles += 1);
        if let Err(err) = self.run_cycle(cycle, tab).await {
            // Exceptions never escape a cycle; they end it
            self.logger.error(format!("cycle {cycle} failed: {err}"), None);
        }
        self.finish_cycle().await;
    }

    async fn run_cycle(&self, cycle: u64, tab: TabId) -> Result<(), super::EngineError> {
        if !self.transition(BotState::Scanning) {
            return Ok(());
        }

        // Rate limit gates the SCAN itself
        let limited = self.with_state(|s| {
            roll_rate_window(s, self.clock.epoch_ms());
            s.actions_this_hour >= s.config.max_actions_per_hour
        });
        if limited {
            self.logger.info(format!("cycle {cycle}: hourly action limit reached"), None);
            return Ok(());
        }

        // SCAN
        let mut state = match self.bridge.scan(tab).await {
            Ok(state) => state,
            Err(err) => {
                if self.captcha_probe(tab).await {
                    self.emergency_stop("Captcha detected on page").await;
                    return Ok(());
                }
                self.with_state(|s| {
                    s.consecutive_failures += 1;
                    s.stats.scan_failures += 1;
                });
                self.logger.warn(format!("cycle {cycle}: scan failed: {err}"), None);
                return Ok(());
            }
        };
        // Scan success does not reset consecutive_failures; task success does
        self.with_state(|s| s.stats.scans += 1);

        if state.captcha {
            self.emergency_stop("Captcha detected on page").await;
            return Ok(());
        }

        // Session-expiry streak
        match state.logged_in {
            Some(false) => {
                let streak = self.with_state(|s| {
                    s.not_logged_in_streak += 1;
                    s.not_logged_in_streak
                });
                let cap = self.with_state(|s| s.config.safety.max_not_logged_in);
                if streak >= cap {
                    self.emergency_stop(&format!(
                        "Session expired after {streak} consecutive logged-out scans"
                    ))
                    .await;
                } else {
                    self.logger.warn(
                        format!("cycle {cycle}: scan reports logged out (streak {streak})"),
                        None,
                    );
                }
                return Ok(());
            }
            Some(true) => self.with_state(|s| s.not_logged_in_streak = 0),
            None => {}
        }

        self.refresh_buildings_if_stale(tab, &mut state).await;

        // Version drift is logged, never fatal
        let version_change = self.with_state(|s| {
            let Some(version) = &state.version else { return None };
            let changed = s
                .game_version
                .as_ref()
                .filter(|prev| *prev != version)
                .map(|prev| (prev.clone(), version.clone()));
            s.game_version = Some(version.clone());
            changed
        });
        if let Some((from, to)) = version_change {
            self.logger.warn(format!("game version changed: {from} -> {to}"), None);
        }

        // DECIDE
        if !self.transition(BotState::Deciding) {
            return Ok(());
        }
        let (config, queue_view, last_farm) = self.with_state(|s| {
            (s.config.clone(), s.queue.get_all().to_vec(), s.last_farm_at_ms)
        });
        state.last_farm_at_ms = Some(last_farm);
        self.with_state(|s| s.game = Some(state.clone()));

        let proposals = self.strategy.decide(&state, &config, &queue_view);

        if proposals.iter().any(|p| p.kind == TaskKind::EmergencyStop) {
            self.emergency_stop("Strategy requested emergency stop").await;
            return Ok(());
        }

        // Enqueue whatever is not cooling down; the queue dedups the rest
        let now_ms = self.clock.epoch_ms();
        self.with_state(|s| {
            s.cooldowns.purge(now_ms);
            for proposal in proposals {
                let key = cooldown_key_for(proposal.kind, &proposal.params);
                let kind_key = proposal.kind.to_string();
                if s.cooldowns.is_active(&key, now_ms) || s.cooldowns.is_active(&kind_key, now_ms) {
                    tracing::debug!(server = %self.server, key, "proposal dropped: cooling down");
                    continue;
                }
                let _ = s.queue.add(
                    proposal.kind,
                    proposal.params,
                    proposal.priority,
                    proposal.village_id,
                    proposal.scheduled_for_ms,
                );
            }
        });

        // Proactive hero claim can consume the whole cycle
        if self.maybe_proactive_hero_claim(tab, &state).await {
            self.set_loop_interval(true);
            return Ok(());
        }

        if self.check_circuit_breaker().await {
            return Ok(());
        }

        // EXECUTE at most one task
        let next = self.with_state(|s| s.queue.get_next());
        let Some(task) = next else {
            self.set_loop_interval(false);
            return Ok(());
        };
        self.execute_task(tab, task).await;
        self.set_loop_interval(true);
        Ok(())
    }

    /// The cycle's unwind path; runs no matter how the cycle ended.
    async fn finish_cycle(&self) {
        let dirty = self.with_state(|s| {
            if s.fsm.is_cycle_state() && s.fsm.can_transition_to(BotState::Idle) {
                s.fsm = BotState::Idle;
            }
            s.cycle_lock = None;
            s.queue.dirty_at() > 0
        });
        if let Err(err) = self.logger.flush().await {
            tracing::warn!(server = %self.server, error = %err, "eager log flush failed");
        }
        if dirty {
            if let Err(err) = self.save_state().await {
                self.logger.warn(format!("post-cycle state save failed: {err}"), None);
            }
        }
    }

    /// Lightweight captcha check used when a full scan fails.
    async fn captcha_probe(&self, tab: TabId) -> bool {
        match self.bridge.get_state(tab, "captcha").await {
            Ok(result) if result.success => result.data.map(|v| value_truthy(&v)).unwrap_or(false),
            _ => false,
        }
    }

    /// Re-scan from the village view when building-level work is wanted
    /// and the cached snapshot is older than the refresh interval.
    async fn refresh_buildings_if_stale(&self, tab: TabId, state: &mut GameState) {
        let refresh = self.with_state(|s| {
            let wanted = s.config.auto_upgrade_buildings || s.config.auto_build;
            let stale = s.cached_buildings_cycle == 0
                || s.cycle_counter >= s.cached_buildings_cycle + BUILDING_REFRESH_CYCLES;
            wanted && stale
        });
        if !refresh {
            // Serve the cache so deciders still see building levels
            self.with_state(|s| {
                if state.buildings.is_empty() && !s.cached_buildings.is_empty() {
                    state.buildings = s.cached_buildings.clone();
                }
            });
            return;
        }

        let nav = self
            .bridge
            .execute(tab, reeve_core::PageAction::NavigateTo, json!({"page": "dorf2"}))
            .await;
        match nav {
            Ok(result) if result.success => {}
            Ok(_) | Err(_) => {
                self.logger.warn("building refresh: navigation to village view failed", None);
                return;
            }
        }
        self.bridge.wait_for_content_script(tab, super::execute::EXECUTOR_WAIT).await;

        match self.bridge.scan(tab).await {
            Ok(village) => {
                state.buildings = village.buildings.clone();
                merge_construction_queues(state, village.construction_queue);
                self.with_state(|s| {
                    s.cached_buildings = village.buildings;
                    s.cached_buildings_cycle = s.cycle_counter;
                });
            }
            Err(err) => {
                self.logger.warn(format!("building refresh scan failed: {err}"), None);
            }
        }

        // Back to the resource overview either way
        let back = self
            .bridge
            .execute(tab, reeve_core::PageAction::NavigateTo, json!({"page": "dorf1"}))
            .await;
        if back.map(|r| r.success).unwrap_or(false) {
            self.bridge.wait_for_content_script(tab, super::execute::EXECUTOR_WAIT).await;
        }
    }

    /// Adjust the main loop to the active or idle interval.
    fn set_loop_interval(&self, active: bool) {
        let secs = self.with_state(|s| {
            if active {
                s.config.delays.cycle_base_secs
            } else {
                s.config.delays.idle_secs
            }
        });
        self.scheduler.lock().reschedule(MAIN_LOOP, Duration::from_secs(secs), self.clock.now());
    }
}

/// Advance the rolling hour window in place.
pub(super) fn roll_rate_window<C: Clock>(s: &mut EngineState<C>, now_ms: u64) {
    if now_ms.saturating_sub(s.hour_reset_at_ms) >= HOUR_MS {
        s.actions_this_hour = 0;
        s.hour_reset_at_ms = now_ms;
    }
}

/// Union of the overview's and the village view's construction queues.
fn merge_construction_queues(
    state: &mut GameState,
    village_queue: Vec<reeve_core::game::ConstructionEntry>,
) {
    for entry in village_queue {
        let seen = state
            .construction_queue
            .iter()
            .any(|e| e.slot == entry.slot && e.name == entry.name && e.level == entry.level);
        if !seen {
            state.construction_queue.push(entry);
        }
    }
}

fn value_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty() && s != "false" && s != "0",
        Value::Null => false,
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
#[path = "cycle_tests.rs"]
mod tests;
