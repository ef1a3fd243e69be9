// SPDX-License-Identifier: MIT

use super::super::test_helpers::*;
use crate::strategy::TaskProposal;
use crate::transport::TransportError;
use reeve_core::test_support::{field_params, logged_in_state};
use reeve_core::{BotState, Capacity, CyclePhase, PageAction, Resources, TaskKind, TaskStatus};
use reeve_storage::RunStateStore;

fn upgrade_proposal(field: u32) -> TaskProposal {
    TaskProposal::new(TaskKind::UpgradeResource, field_params(field), 5).for_village("v1")
}

/// Scan state for an account low on wood (10% of capacity), hero home.
fn low_wood_state() -> reeve_core::GameState {
    let mut state = logged_in_state();
    state.resources = Some(Resources { wood: 80, clay: 500, iron: 500, crop: 400 });
    state.capacity = Some(Capacity { warehouse: 800, granary: 800 });
    state
}

// One full cycle ending in a completed task
#[tokio::test]
async fn basic_cycle_success() {
    let h = started_harness().await;
    h.transport.set_default_scan(low_wood_state());
    h.strategy.push_proposals(vec![upgrade_proposal(3)]);

    h.engine.tick_main_loop().await;

    let tasks = h.engine.queue_tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].status, TaskStatus::Completed);
    assert_eq!(tasks[0].kind, TaskKind::UpgradeResource);

    let status = h.engine.status();
    assert_eq!(status.stats.tasks_completed, 1);
    assert_eq!(status.actions_this_hour, 1);
    assert_eq!(status.state, BotState::Idle);

    // The strategy saw the injected last-farm timestamp
    let observed = h.strategy.observed_states();
    assert_eq!(observed.len(), 1);
    assert_eq!(observed[0].last_farm_at_ms, Some(0));

    // Forward progress was persisted with the resurrection signal
    let persisted = RunStateStore::new(h.storage.clone())
        .load(&server())
        .await
        .unwrap()
        .unwrap();
    assert!(persisted.was_running);
    assert_eq!(persisted.stats.tasks_completed, 1);
    assert_eq!(persisted.actions_this_hour, 1);
}

// Captcha in a successful scan is an emergency
#[tokio::test]
async fn captcha_in_scan_emergency_stops() {
    let h = started_harness().await;
    let mut state = logged_in_state();
    state.captcha = true;
    h.transport.push_scan_state(state);

    h.engine.tick_main_loop().await;

    assert_eq!(h.engine.fsm_state(), BotState::Stopped);
    assert!(h.engine.emergency_stopped());
    assert_eq!(
        h.engine.emergency_reason().await.as_deref(),
        Some("Captcha detected on page")
    );
    // No task was executed
    assert!(h.transport.executed_actions().is_empty());
    // The page was told
    assert_eq!(h.transport.notifications().len(), 1);
}

// Captcha probe after a failed scan also escalates
#[tokio::test]
async fn captcha_probe_after_scan_failure() {
    let h = started_harness().await;
    h.transport.push_scan_error(TransportError::Other("boom".into()));
    h.transport.push_get_state("captcha", reeve_core::ExecResult::ok_with(serde_json::json!(true)));

    h.engine.tick_main_loop().await;

    assert!(h.engine.emergency_stopped());
    assert_eq!(
        h.engine.emergency_reason().await.as_deref(),
        Some("Captcha detected on page")
    );
}

// Plain scan failure: counted, not fatal
#[tokio::test]
async fn scan_failure_counts_toward_breaker() {
    let h = started_harness().await;
    h.transport.push_scan_error(TransportError::Other("boom".into()));

    h.engine.tick_main_loop().await;

    assert!(!h.engine.emergency_stopped());
    assert_eq!(h.engine.fsm_state(), BotState::Idle);
    let status = h.engine.status();
    assert_eq!(status.consecutive_failures, 1);
    assert_eq!(status.stats.scan_failures, 1);
}

// Five consecutive logged-out scans end the session
#[tokio::test]
async fn session_expiry_streak() {
    let h = started_harness().await;
    for _ in 0..5 {
        let mut state = logged_in_state();
        state.logged_in = Some(false);
        h.transport.push_scan_state(state);
    }

    for _ in 0..4 {
        h.engine.tick_main_loop().await;
        assert!(!h.engine.emergency_stopped());
    }
    h.engine.tick_main_loop().await;

    assert!(h.engine.emergency_stopped());
    let reason = h.engine.emergency_reason().await.unwrap_or_default();
    assert!(reason.starts_with("Session expired"), "{reason}");
    // None of the five cycles executed anything
    assert!(h.transport.executed_actions().is_empty());
}

#[tokio::test]
async fn logged_in_scan_resets_streak() {
    let h = started_harness().await;
    for _ in 0..4 {
        let mut state = logged_in_state();
        state.logged_in = Some(false);
        h.transport.push_scan_state(state);
    }
    for _ in 0..4 {
        h.engine.tick_main_loop().await;
    }
    // A good scan breaks the streak
    h.engine.tick_main_loop().await;
    // Four more logged-out scans stay under the fresh threshold
    for _ in 0..4 {
        let mut state = logged_in_state();
        state.logged_in = Some(false);
        h.transport.push_scan_state(state);
        h.engine.tick_main_loop().await;
    }
    assert!(!h.engine.emergency_stopped());
}

// The hourly counter gates the SCAN itself
#[tokio::test]
async fn rate_limit_blocks_scan() {
    let h = started_harness().await;
    h.engine.with_state(|s| s.actions_this_hour = s.config.max_actions_per_hour);

    h.engine.tick_main_loop().await;
    assert_eq!(h.transport.scan_count(), 0);

    // Window rollover re-opens the gate exactly once per hour
    h.clock.advance_secs(3601);
    h.engine.tick_main_loop().await;
    assert_eq!(h.transport.scan_count(), 1);
    assert_eq!(h.engine.status().actions_this_hour, 0);
}

// A held cycle lock blocks re-entry
#[tokio::test]
async fn cycle_lock_blocks_reentry() {
    let h = started_harness().await;
    h.engine.with_state(|s| s.cycle_lock = Some(CyclePhase::Executing));

    h.engine.tick_main_loop().await;
    assert_eq!(h.transport.scan_count(), 0);

    h.engine.with_state(|s| s.cycle_lock = None);
    h.engine.tick_main_loop().await;
    assert_eq!(h.transport.scan_count(), 1);
}

#[tokio::test]
async fn heartbeat_poke_respects_cycle_lock() {
    let h = started_harness().await;
    // A cycle is mid-flight: the heartbeat's tick must not start another
    h.engine.with_state(|s| s.cycle_lock = Some(CyclePhase::Scanning));
    h.engine.heartbeat().await;
    assert_eq!(h.transport.scan_count(), 0);

    h.engine.with_state(|s| s.cycle_lock = None);
    h.engine.heartbeat().await;
    assert_eq!(h.transport.scan_count(), 1);
}

#[tokio::test]
async fn strategy_emergency_meta_task_honoured() {
    let h = started_harness().await;
    h.strategy.push_proposals(vec![TaskProposal::new(
        TaskKind::EmergencyStop,
        Default::default(),
        1,
    )]);

    h.engine.tick_main_loop().await;

    assert!(h.engine.emergency_stopped());
    assert_eq!(
        h.engine.emergency_reason().await.as_deref(),
        Some("Strategy requested emergency stop")
    );
}

#[tokio::test]
async fn cooldown_suppresses_reproposals() {
    let h = started_harness().await;
    h.strategy.repeat_proposals(vec![upgrade_proposal(3)]);

    // Cycle 1 executes the upgrade and sets its 60s cooldown
    h.engine.tick_main_loop().await;
    assert_eq!(h.engine.status().stats.tasks_completed, 1);

    // Cycle 2: the same proposal is dropped while cooling
    h.engine.tick_main_loop().await;
    assert_eq!(h.engine.status().stats.tasks_completed, 1);

    // After the cooldown it flows again
    h.clock.advance_secs(61);
    h.engine.tick_main_loop().await;
    assert_eq!(h.engine.status().stats.tasks_completed, 2);
}

#[tokio::test]
async fn version_change_is_logged_not_fatal() {
    let h = started_harness().await;
    let mut v1 = logged_in_state();
    v1.version = Some("4.6".into());
    let mut v2 = logged_in_state();
    v2.version = Some("4.7".into());
    h.transport.push_scan_state(v1);
    h.transport.push_scan_state(v2);

    h.engine.tick_main_loop().await;
    h.engine.tick_main_loop().await;

    assert!(!h.engine.emergency_stopped());
    let entries = h.logger.entries(None);
    assert!(entries.iter().any(|e| e.message.contains("game version changed")));
}

#[tokio::test]
async fn building_refresh_every_third_cycle() {
    let h = started_harness().await;
    h.engine.with_state(|s| s.config.auto_upgrade_buildings = true);

    // Cycle 1: stale cache; detour dorf2 + rescan + back
    h.engine.tick_main_loop().await;
    assert_eq!(h.transport.scan_count(), 2);
    let navs = h
        .transport
        .executed_actions()
        .iter()
        .filter(|a| **a == PageAction::NavigateTo)
        .count();
    assert_eq!(navs, 2);

    // Cycles 2 and 3 serve the cache
    h.engine.tick_main_loop().await;
    h.engine.tick_main_loop().await;
    assert_eq!(h.transport.scan_count(), 4);

    // Cycle 4: cache is three cycles old; refresh again
    h.engine.tick_main_loop().await;
    assert_eq!(h.transport.scan_count(), 6);
}

#[tokio::test]
async fn idle_cycle_returns_to_idle_interval() {
    let h = started_harness().await;
    h.engine.tick_main_loop().await;

    let status = h.engine.scheduler.lock().status();
    let idle = h.engine.with_state(|s| s.config.delays.idle_secs);
    assert_eq!(
        status[super::super::MAIN_LOOP].interval,
        std::time::Duration::from_secs(idle)
    );
}

// An empty hero inventory never blocks the cycle
#[tokio::test]
async fn empty_hero_inventory_does_not_short_circuit() {
    let h = started_harness().await;
    h.transport.set_default_scan(low_wood_state());
    h.strategy.push_proposals(vec![upgrade_proposal(3)]);

    h.engine.tick_main_loop().await;

    // The claim was attempted (inventory scan) but found nothing, so the
    // task still executed
    assert!(h
        .transport
        .executed_actions()
        .contains(&PageAction::ScanHeroInventory));
    assert_eq!(h.engine.status().stats.tasks_completed, 1);
    assert_eq!(h.engine.status().stats.hero_claims, 0);
}
