// SPDX-License-Identifier: MIT

//! Task execution: liveness probe, village assertion, dispatch, result
//! handling, and the return-home leg.

use super::{BotEngine, EngineState};
use crate::strategy::Strategy;
use crate::transport::{PageTransport, TabId};
use reeve_core::{
    fail_cooldown, success_cooldown, BotState, Clock, CyclePhase, FailReason, PageAction, Task,
    TaskKind, TaskStatus, VillageInfo,
};
use serde_json::json;
use std::time::Duration;

/// How long to wait for the executor to reattach after a page reload.
pub(crate) const EXECUTOR_WAIT: Duration = Duration::from_secs(15);

/// Cooldown before retrying a task rescued by the hero fallback.
const HERO_REQUEUE_COOLDOWN: Duration = Duration::from_secs(15);

pub(super) enum TaskOutcome {
    Success,
    /// The page executor answered with a failure reason.
    PageFailure(FailReason),
    /// Transport or engine trouble; counts toward consecutive failures.
    Error(String),
}

impl<T, S, C> BotEngine<T, S, C>
where
    T: PageTransport,
    S: Strategy,
    C: Clock,
{
    /// Execute one claimed task, then return home.
    pub(crate) async fn execute_task(&self, tab: TabId, task: Task) {
        self.with_state(|s| s.cycle_lock = Some(CyclePhase::Executing));
        self.transition(BotState::Executing);
        self.logger.info(
            format!("executing task {} ({}, priority {})", task.id, task.kind, task.priority),
            None,
        );

        let outcome = self.execute_task_inner(tab, &task).await;
        self.handle_task_outcome(tab, &task, outcome).await;

        // The return leg always runs; its failures are logged and swallowed
        self.transition(BotState::Cooldown);
        self.with_state(|s| s.cycle_lock = Some(CyclePhase::Returning));
        self.return_home(tab, task.kind).await;
    }

    async fn execute_task_inner(&self, tab: TabId, task: &Task) -> TaskOutcome {
        // Liveness probe: don't burn a retry on a dead executor
        match self.bridge.get_state(tab, "page").await {
            Ok(result) if result.success => {}
            _ => return TaskOutcome::Error("executor unavailable".into()),
        }

        // Reconcile the active village in case the operator switched it
        self.refresh_villages(tab).await;

        // Village assertion
        if let Some(village) = task.village_id.as_deref() {
            if !self.ensure_village(tab, village).await {
                return TaskOutcome::PageFailure(FailReason::PageMismatch);
            }
        }

        match self.dispatch_task(tab, task).await {
            Ok(result) if result.success => TaskOutcome::Success,
            Ok(result) => TaskOutcome::PageFailure(
                result.fail_reason().unwrap_or_else(|| FailReason::Other("unknown".into())),
            ),
            Err(err) => TaskOutcome::Error(err.to_string()),
        }
    }

    /// Cheap village-list probe; updates the cached game state.
    async fn refresh_villages(&self, tab: TabId) {
        let Ok(result) = self.bridge.get_state(tab, "villages").await else { return };
        if !result.success {
            return;
        }
        let Some(data) = result.data else { return };
        let Ok(villages) = serde_json::from_value::<Vec<VillageInfo>>(data) else {
            tracing::debug!(server = %self.server, "unparseable village list dropped");
            return;
        };
        self.with_state(|s| {
            if let Some(game) = &mut s.game {
                if let Some(active) = villages.iter().find(|v| v.active) {
                    game.active_village = Some(active.id.clone());
                }
                game.villages = villages;
            }
        });
    }

    /// Switch to `village` if it is not already active.
    async fn ensure_village(&self, tab: TabId, village: &str) -> bool {
        let active = self.with_state(|s| s.game.as_ref().and_then(|g| g.active_village.clone()));
        if active.as_deref() == Some(village) {
            return true;
        }
        let switched = self
            .bridge
            .execute(tab, PageAction::SwitchVillage, json!({"villageId": village}))
            .await
            .map(|r| r.success)
            .unwrap_or(false);
        if !switched {
            self.logger.warn(format!("could not switch to village {village}"), None);
            return false;
        }
        self.human_delay().await;
        self.bridge.wait_for_content_script(tab, EXECUTOR_WAIT).await;
        self.with_state(|s| {
            if let Some(game) = &mut s.game {
                game.active_village = Some(village.to_string());
            }
        });
        true
    }

    async fn handle_task_outcome(&self, tab: TabId, task: &Task, outcome: TaskOutcome) {
        let now_ms = self.clock.epoch_ms();
        match outcome {
            TaskOutcome::Success => {
                self.with_state(|s| {
                    s.queue.mark_completed(task.id);
                    s.stats.tasks_completed += 1;
                    super::cycle::roll_rate_window(s, now_ms);
                    s.actions_this_hour += 1;
                    s.consecutive_failures = 0;
                    s.breaker_trips = 0;
                    s.cooldowns.set(task.cooldown_key(), success_cooldown(task.kind), now_ms);
                    if task.kind == TaskKind::SendFarm {
                        s.last_farm_at_ms = now_ms;
                    }
                });
                self.logger.info(format!("task {} completed", task.id), None);
            }
            TaskOutcome::PageFailure(reason) if reason.is_hopeless() => {
                self.with_state(|s| {
                    // Retries are pointless: jump straight to terminal
                    s.queue.update(task.id, |t| t.retries = t.max_retries.saturating_sub(1));
                    s.queue.mark_failed(task.id, reason.wire_name());
                    let key = if reason.is_type_level() {
                        task.kind.to_string()
                    } else {
                        task.cooldown_key()
                    };
                    s.cooldowns.set(key, fail_cooldown(&reason), now_ms);
                    s.stats.tasks_failed += 1;
                });
                self.logger.warn(
                    format!("task {} failed hopelessly: {}", task.id, reason.wire_name()),
                    None,
                );

                if reason == FailReason::InsufficientResources && task.kind.is_build_like() {
                    if self.reactive_hero_claim(tab, task).await {
                        self.with_state(|s| {
                            let _ = s.queue.add(
                                task.kind,
                                task.params.clone(),
                                task.priority,
                                task.village_id.clone(),
                                None,
                            );
                            s.cooldowns.set(
                                task.cooldown_key(),
                                HERO_REQUEUE_COOLDOWN,
                                self.clock.epoch_ms(),
                            );
                        });
                        self.logger.info(
                            format!("task {} requeued after hero resource transfer", task.id),
                            None,
                        );
                    }
                }
            }
            TaskOutcome::PageFailure(reason) => {
                self.with_state(|s| {
                    s.queue.mark_failed(task.id, reason.wire_name());
                    note_terminal_failure(s, task.id);
                });
                self.logger.warn(
                    format!("task {} failed: {}", task.id, reason.wire_name()),
                    None,
                );
            }
            TaskOutcome::Error(message) => {
                self.with_state(|s| {
                    s.queue.mark_failed(task.id, &message);
                    note_terminal_failure(s, task.id);
                    s.consecutive_failures += 1;
                });
                self.logger.warn(format!("task {} errored: {message}", task.id), None);
            }
        }
    }

    /// Navigate back to the resource overview, detouring through the
    /// village view for building tasks so the cache stays warm.
    pub(super) async fn return_home(&self, tab: TabId, kind: TaskKind) {
        if kind.ends_at_overview() {
            return;
        }
        if matches!(kind, TaskKind::UpgradeBuilding | TaskKind::BuildNew) {
            match self.bridge.execute(tab, PageAction::NavigateTo, json!({"page": "dorf2"})).await {
                Ok(result) if result.success => {
                    self.bridge.wait_for_content_script(tab, EXECUTOR_WAIT).await;
                    if let Ok(village) = self.bridge.scan(tab).await {
                        self.with_state(|s| {
                            s.cached_buildings = village.buildings;
                            s.cached_buildings_cycle = s.cycle_counter;
                        });
                    }
                }
                Ok(_) => tracing::debug!(server = %self.server, "return-home detour refused"),
                Err(err) => {
                    self.logger.warn(format!("return-home detour failed: {err}"), None);
                }
            }
        }
        match self.bridge.execute(tab, PageAction::NavigateTo, json!({"page": "dorf1"})).await {
            Ok(result) if result.success => {
                self.bridge.wait_for_content_script(tab, EXECUTOR_WAIT).await;
            }
            Ok(_) => tracing::debug!(server = %self.server, "return-home navigation refused"),
            Err(err) => {
                self.logger.warn(format!("return-home failed: {err}"), None);
            }
        }
    }
}

/// Bump the failure counter only when the task went terminal.
fn note_terminal_failure<C: Clock>(s: &mut EngineState<C>, id: reeve_core::TaskId) {
    if s.queue.get(id).map(|t| t.status == TaskStatus::Failed).unwrap_or(false) {
        s.stats.tasks_failed += 1;
    }
}

#[cfg(test)]
#[path = "execute_tests.rs"]
mod tests;
