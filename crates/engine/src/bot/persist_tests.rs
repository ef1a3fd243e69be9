// SPDX-License-Identifier: MIT

use super::super::test_helpers::*;
use super::super::{HOURLY_RESET, MAIN_LOOP, PERSIST_STATE};
use reeve_core::{BotState, BotStats, Clock, PersistedRunState, Task, TaskStatus};
use reeve_storage::{ConfigStore, RunStateStore};
use std::time::Duration;

#[tokio::test]
async fn start_arms_all_cycles() {
    let h = started_harness().await;

    let scheduler = h.engine.scheduler.lock();
    assert!(scheduler.is_started());
    assert!(scheduler.is_scheduled(MAIN_LOOP));
    assert!(scheduler.is_scheduled(HOURLY_RESET));
    assert!(scheduler.is_scheduled(PERSIST_STATE));

    let status = scheduler.status();
    assert_eq!(status[MAIN_LOOP].interval, Duration::from_secs(45));
    assert_eq!(status[HOURLY_RESET].interval, Duration::from_secs(3600));
    assert_eq!(status[PERSIST_STATE].interval, Duration::from_secs(60));
}

#[tokio::test]
async fn start_loads_persisted_config() {
    let h = harness();
    let mut config = fast_config();
    config.max_actions_per_hour = 25;
    ConfigStore::new(h.storage.clone()).save(&server(), &config, &h.clock).await.unwrap();

    h.engine.start().await.unwrap();
    assert_eq!(h.engine.config().max_actions_per_hour, 25);
}

#[tokio::test]
async fn double_start_is_rejected() {
    let h = started_harness().await;
    assert!(matches!(h.engine.start().await, Err(super::super::EngineError::AlreadyRunning)));
}

// Restore tasks, counters, and the farm timestamp after a restart
#[tokio::test]
async fn start_restores_run_state_within_the_hour() {
    let h = harness();
    let store = RunStateStore::new(h.storage.clone());
    let now = h.clock.epoch_ms();
    store
        .save(
            &server(),
            &PersistedRunState {
                stats: BotStats { tasks_completed: 9, ..Default::default() },
                tasks: vec![
                    Task::builder().id(4).status(TaskStatus::Pending).build(),
                    Task::builder().id(5).status(TaskStatus::Running).started_at_ms(now).build(),
                ],
                actions_this_hour: 3,
                hour_reset_at_ms: now - 600_000,
                last_farm_at_ms: now - 120_000,
                was_running: true,
                saved_at_ms: now,
            },
        )
        .await
        .unwrap();

    h.engine.start().await.unwrap();

    let status = h.engine.status();
    assert_eq!(status.actions_this_hour, 3);
    assert_eq!(status.stats.tasks_completed, 9);
    assert_eq!(status.state, BotState::Idle);

    // The task that was mid-flight when the host died is pending again
    let tasks = h.engine.queue_tasks();
    assert_eq!(tasks.len(), 2);
    assert!(tasks.iter().all(|t| t.status == TaskStatus::Pending));
    assert_eq!(h.engine.with_state(|s| s.last_farm_at_ms), now - 120_000);
}

#[tokio::test]
async fn stale_hour_window_resets_counter() {
    let h = harness();
    let now = h.clock.epoch_ms();
    RunStateStore::new(h.storage.clone())
        .save(
            &server(),
            &PersistedRunState {
                actions_this_hour: 42,
                hour_reset_at_ms: now - 7_200_000,
                was_running: true,
                saved_at_ms: now,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    h.engine.start().await.unwrap();
    assert_eq!(h.engine.status().actions_this_hour, 0);
}

#[tokio::test]
async fn stop_clears_resurrection_signal() {
    let h = started_harness().await;
    h.engine.stop().await.unwrap();

    assert_eq!(h.engine.fsm_state(), BotState::Stopped);
    assert!(!h.engine.scheduler.lock().is_started());

    let persisted =
        RunStateStore::new(h.storage.clone()).load(&server()).await.unwrap().unwrap();
    assert!(!persisted.was_running);
}

// A save clears the dirty bit until the next mutation
#[tokio::test]
async fn save_state_marks_queue_clean() {
    let h = started_harness().await;
    let _ = h.engine.add_task(reeve_core::TaskKind::Navigate, Default::default(), 5, None);
    assert!(h.engine.with_state(|s| s.queue.dirty_at()) > 0);

    h.engine.save_state().await.unwrap();
    assert_eq!(h.engine.with_state(|s| s.queue.dirty_at()), 0);

    h.clock.advance_secs(1);
    let _ = h.engine.add_task(reeve_core::TaskKind::SendFarm, Default::default(), 5, None);
    assert!(h.engine.with_state(|s| s.queue.dirty_at()) > 0);
}

// The heartbeat resurrects lost cycles
#[tokio::test]
async fn heartbeat_resurrects_main_loop() {
    let h = started_harness().await;
    {
        let mut scheduler = h.engine.scheduler.lock();
        scheduler.clear(MAIN_LOOP);
        scheduler.clear(HOURLY_RESET);
    }

    h.engine.heartbeat().await;

    let scheduler = h.engine.scheduler.lock();
    assert!(scheduler.is_scheduled(MAIN_LOOP));
    assert!(scheduler.is_scheduled(HOURLY_RESET));
    assert_eq!(scheduler.status()[MAIN_LOOP].interval, Duration::from_secs(45));
}

#[tokio::test]
async fn heartbeat_on_stopped_engine_is_a_no_op() {
    let h = harness();
    h.engine.heartbeat().await;
    assert_eq!(h.transport.scan_count(), 0);
    assert_eq!(h.engine.fsm_state(), BotState::Stopped);
}

#[tokio::test]
async fn heartbeat_ticks_the_loop() {
    let h = started_harness().await;
    h.engine.heartbeat().await;
    assert_eq!(h.transport.scan_count(), 1);
}

#[tokio::test]
async fn emergency_stop_persists_reason_and_unwinds() {
    let h = started_harness().await;
    h.engine.emergency_stop("Captcha detected on page").await;

    assert_eq!(h.engine.fsm_state(), BotState::Stopped);
    assert!(h.engine.emergency_stopped());
    assert!(!h.engine.scheduler.lock().is_started());

    let record = RunStateStore::new(h.storage.clone())
        .fresh_emergency(h.clock.epoch_ms())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.reason, "Captcha detected on page");

    let persisted =
        RunStateStore::new(h.storage.clone()).load(&server()).await.unwrap().unwrap();
    assert!(!persisted.was_running);
}

#[tokio::test]
async fn restart_clears_emergency_latch() {
    let h = started_harness().await;
    h.engine.emergency_stop("Session expired after 5 consecutive logged-out scans").await;
    assert!(h.engine.emergency_stopped());

    h.engine.start().await.unwrap();
    assert!(!h.engine.emergency_stopped());
    assert_eq!(h.engine.fsm_state(), BotState::Idle);
}

#[tokio::test]
async fn persisted_emergency_reason_survives_restart() {
    let h = started_harness().await;
    h.engine.emergency_stop("Captcha detected on page").await;

    // A second engine over the same storage (fresh process) sees the reason
    let h2 = harness_with_storage(h.storage.clone(), h.clock.clone());
    assert_eq!(
        h2.engine.emergency_reason().await.as_deref(),
        Some("Captcha detected on page")
    );

    // After the freshness window it is gone
    h.clock.advance(Duration::from_secs(3600));
    assert_eq!(h2.engine.emergency_reason().await, None);
}
