// SPDX-License-Identifier: MIT

//! The per-server bot engine.
//!
//! One engine owns one task queue, one scheduler, and one FSM. Everything
//! that happens to a server goes through here: timer ticks, heartbeats,
//! supervisor commands. The FSM transition table is enforced at a single
//! choke point; illegal transitions are rejected with a warning and the
//! engine stays where it was.

mod breaker;
mod cycle;
mod dispatch;
mod execute;
mod hero;
mod persist;

#[cfg(test)]
pub(crate) mod test_helpers;

use crate::bridge::{BridgeError, ExecutorBridge};
use crate::cooldown::CooldownMap;
use crate::scheduler::Scheduler;
use crate::strategy::Strategy;
use crate::transport::{PageTransport, TabId};
use parking_lot::Mutex;
use reeve_core::{
    game::BuildingSlot, BotConfig, BotState, BotStats, Clock, CyclePhase, GameState, ServerKey,
    TaskQueue,
};
use reeve_storage::{ConfigStore, RunStateStore, Storage, StorageError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Scheduler cycle names.
pub const MAIN_LOOP: &str = "main_loop";
pub const HOURLY_RESET: &str = "hourly_reset";
pub const PERSIST_STATE: &str = "persist_state";
pub const BREAKER_RESUME: &str = "breaker_resume";

/// Cached building snapshots go stale after this many cycles.
pub(crate) const BUILDING_REFRESH_CYCLES: u64 = 3;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error("engine has no bound tab")]
    NoTab,
    #[error("engine is already running")]
    AlreadyRunning,
}

/// Constructor dependencies for one engine.
pub struct EngineDeps<T, S, C: Clock> {
    pub server: ServerKey,
    pub transport: Arc<T>,
    pub strategy: S,
    pub storage: Storage,
    pub logger: reeve_storage::BotLogger<C>,
    pub clock: C,
}

/// Everything mutable behind the engine's state lock.
pub(crate) struct EngineState<C: Clock> {
    pub fsm: BotState,
    pub tab: Option<TabId>,
    pub config: BotConfig,
    pub stats: BotStats,
    pub queue: TaskQueue<C>,
    pub game: Option<GameState>,
    pub game_version: Option<String>,
    pub actions_this_hour: u32,
    pub hour_reset_at_ms: u64,
    pub last_farm_at_ms: u64,
    pub consecutive_failures: u32,
    pub breaker_trips: u32,
    pub not_logged_in_streak: u32,
    pub cycle_lock: Option<CyclePhase>,
    pub cycle_counter: u64,
    pub cached_buildings: Vec<BuildingSlot>,
    /// Cycle number when buildings were last cached; 0 = never.
    pub cached_buildings_cycle: u64,
    pub cooldowns: CooldownMap,
    pub emergency_latched: bool,
    pub emergency_reason: Option<String>,
}

/// Snapshot of an engine for the operator UI.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub server: ServerKey,
    pub state: BotState,
    pub running: bool,
    pub paused: bool,
    pub emergency_stopped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emergency_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tab: Option<TabId>,
    pub stats: BotStats,
    pub queue_len: usize,
    pub pending_tasks: usize,
    pub actions_this_hour: u32,
    pub max_actions_per_hour: u32,
    pub cycle_counter: u64,
    pub consecutive_failures: u32,
    pub breaker_trips: u32,
}

/// One server's automation engine.
pub struct BotEngine<T: PageTransport, S: Strategy, C: Clock> {
    pub(crate) server: ServerKey,
    pub(crate) clock: C,
    pub(crate) bridge: ExecutorBridge<T>,
    pub(crate) strategy: S,
    pub(crate) logger: reeve_storage::BotLogger<C>,
    pub(crate) config_store: ConfigStore,
    pub(crate) run_store: RunStateStore,
    pub(crate) state: Mutex<EngineState<C>>,
    pub(crate) scheduler: Mutex<Scheduler>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl<T, S, C> BotEngine<T, S, C>
where
    T: PageTransport,
    S: Strategy,
    C: Clock,
{
    pub fn new(deps: EngineDeps<T, S, C>) -> Self {
        let queue = TaskQueue::new(deps.clock.clone());
        Self {
            server: deps.server,
            bridge: ExecutorBridge::new(deps.transport),
            strategy: deps.strategy,
            logger: deps.logger,
            config_store: ConfigStore::new(deps.storage.clone()),
            run_store: RunStateStore::new(deps.storage),
            state: Mutex::new(EngineState {
                fsm: BotState::Stopped,
                tab: None,
                config: BotConfig::default(),
                stats: BotStats::default(),
                queue,
                game: None,
                game_version: None,
                actions_this_hour: 0,
                hour_reset_at_ms: deps.clock.epoch_ms(),
                last_farm_at_ms: 0,
                consecutive_failures: 0,
                breaker_trips: 0,
                not_logged_in_streak: 0,
                cycle_lock: None,
                cycle_counter: 0,
                cached_buildings: Vec::new(),
                cached_buildings_cycle: 0,
                cooldowns: CooldownMap::new(),
                emergency_latched: false,
                emergency_reason: None,
            }),
            scheduler: Mutex::new(Scheduler::new()),
            clock: deps.clock,
            cancel: Mutex::new(None),
        }
    }

    pub fn server(&self) -> &ServerKey {
        &self.server
    }

    /// The engine's executor bridge, for supervisor-driven page work.
    pub fn bridge(&self) -> &ExecutorBridge<T> {
        &self.bridge
    }

    /// Run `f` under the state lock. Never held across a suspension point;
    /// the cycle lock covers logical exclusivity instead.
    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut EngineState<C>) -> R) -> R {
        f(&mut self.state.lock())
    }

    /// Attempt an FSM transition. Illegal moves are rejected with a
    /// warning; entering Emergency latches the emergency flag.
    pub(crate) fn transition(&self, to: BotState) -> bool {
        self.with_state(|s| {
            if !s.fsm.can_transition_to(to) {
                tracing::warn!(server = %self.server, from = %s.fsm, to = %to, "rejected FSM transition");
                return false;
            }
            tracing::debug!(server = %self.server, from = %s.fsm, to = %to, "FSM transition");
            s.fsm = to;
            if to == BotState::Emergency {
                s.emergency_latched = true;
            }
            true
        })
    }

    // --- derived getters (the legacy boolean views) ---

    pub fn running(&self) -> bool {
        self.with_state(|s| s.fsm.is_running())
    }

    pub fn paused(&self) -> bool {
        self.with_state(|s| s.fsm == BotState::Paused)
    }

    /// Latched across Emergency → Stopped until the next explicit start.
    pub fn emergency_stopped(&self) -> bool {
        self.with_state(|s| s.emergency_latched)
    }

    pub fn fsm_state(&self) -> BotState {
        self.with_state(|s| s.fsm)
    }

    pub fn tab(&self) -> Option<TabId> {
        self.with_state(|s| s.tab)
    }

    pub fn bind_tab(&self, tab: TabId) {
        self.with_state(|s| s.tab = Some(tab));
    }

    pub fn unbind_tab(&self) {
        self.with_state(|s| s.tab = None);
    }

    // --- operator controls ---

    pub fn pause(&self) -> bool {
        self.transition(BotState::Paused)
    }

    pub fn resume(&self) -> bool {
        self.transition(BotState::Idle)
    }

    pub fn status(&self) -> EngineStatus {
        self.with_state(|s| EngineStatus {
            server: self.server.clone(),
            state: s.fsm,
            running: s.fsm.is_running(),
            paused: s.fsm == BotState::Paused,
            emergency_stopped: s.emergency_latched,
            emergency_reason: s.emergency_reason.clone(),
            tab: s.tab,
            stats: s.stats,
            queue_len: s.queue.len(),
            pending_tasks: s.queue.pending_count(),
            actions_this_hour: s.actions_this_hour,
            max_actions_per_hour: s.config.max_actions_per_hour,
            cycle_counter: s.cycle_counter,
            consecutive_failures: s.consecutive_failures,
            breaker_trips: s.breaker_trips,
        })
    }

    /// Queue contents for the operator UI.
    pub fn queue_tasks(&self) -> Vec<reeve_core::Task> {
        self.with_state(|s| s.queue.get_all().to_vec())
    }

    pub fn add_task(
        &self,
        kind: reeve_core::TaskKind,
        params: reeve_core::TaskParams,
        priority: u8,
        village_id: Option<String>,
    ) -> Option<reeve_core::TaskId> {
        self.with_state(|s| s.queue.add(kind, params, priority, village_id, None))
    }

    pub fn remove_task(&self, id: reeve_core::TaskId) -> bool {
        self.with_state(|s| s.queue.remove(id))
    }

    pub fn clear_queue(&self) {
        self.with_state(|s| s.queue.clear());
    }

    pub fn config(&self) -> BotConfig {
        self.with_state(|s| s.config.clone())
    }

    pub fn apply_config(&self, config: BotConfig) {
        self.with_state(|s| s.config = config);
    }

    pub fn strategy_info(&self) -> serde_json::Value {
        self.strategy.describe()
    }

    pub fn game_state(&self) -> Option<GameState> {
        self.with_state(|s| s.game.clone())
    }

    /// Drive the scheduler until cancelled. The daemon spawns one of
    /// these per started engine; tests poke `tick_main_loop` directly.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        *self.cancel.lock() = Some(cancel.clone());
        loop {
            let sleep_for = {
                let scheduler = self.scheduler.lock();
                scheduler
                    .next_deadline()
                    .map(|at| at.saturating_duration_since(self.clock.now()))
                    .unwrap_or(Duration::from_millis(500))
                    .min(Duration::from_secs(5))
            };
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(sleep_for) => {}
            }
            let fired = self.scheduler.lock().due(self.clock.now());
            for name in fired {
                self.handle_fired(&name).await;
            }
        }
    }

    /// Dispatch one fired scheduler entry.
    pub(crate) async fn handle_fired(&self, name: &str) {
        match name {
            MAIN_LOOP => self.tick_main_loop().await,
            HOURLY_RESET => self.reset_rate_window(),
            PERSIST_STATE => {
                if let Err(err) = self.save_state().await {
                    self.logger.warn(format!("state save failed: {err}"), None);
                }
            }
            BREAKER_RESUME => self.resume_from_breaker(),
            other => {
                tracing::warn!(server = %self.server, cycle = other, "unknown scheduler cycle fired");
            }
        }
    }

    pub(crate) fn cancel_driver(&self) {
        if let Some(cancel) = self.cancel.lock().take() {
            cancel.cancel();
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
