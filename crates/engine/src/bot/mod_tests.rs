// SPDX-License-Identifier: MIT

use super::test_helpers::*;
use super::*;
use reeve_core::TaskKind;

#[test]
fn engine_starts_stopped_and_unlatched() {
    let h = harness();
    assert_eq!(h.engine.fsm_state(), BotState::Stopped);
    assert!(!h.engine.running());
    assert!(!h.engine.paused());
    assert!(!h.engine.emergency_stopped());
    assert_eq!(h.engine.tab(), Some(TAB));
}

#[test]
fn illegal_transitions_leave_state_unchanged() {
    let h = harness();
    // Stopped -> Executing is not in the table
    assert!(!h.engine.transition(BotState::Executing));
    assert_eq!(h.engine.fsm_state(), BotState::Stopped);

    assert!(h.engine.transition(BotState::Idle));
    assert!(!h.engine.transition(BotState::Cooldown));
    assert_eq!(h.engine.fsm_state(), BotState::Idle);
}

#[test]
fn emergency_transition_latches() {
    let h = harness();
    h.engine.transition(BotState::Idle);
    h.engine.transition(BotState::Emergency);
    assert!(h.engine.emergency_stopped());

    // The latch survives Emergency -> Stopped
    h.engine.transition(BotState::Stopped);
    assert_eq!(h.engine.fsm_state(), BotState::Stopped);
    assert!(h.engine.emergency_stopped());
}

#[test]
fn pause_resume_controls_route_through_fsm() {
    let h = harness();
    assert!(h.engine.transition(BotState::Idle));

    assert!(h.engine.pause());
    assert_eq!(h.engine.fsm_state(), BotState::Paused);
    assert!(h.engine.resume());
    assert_eq!(h.engine.fsm_state(), BotState::Idle);

    // Illegal request: rejected, state unchanged
    assert!(h.engine.transition(BotState::Stopped));
    assert!(!h.engine.pause());
    assert_eq!(h.engine.fsm_state(), BotState::Stopped);
}

#[test]
fn status_reflects_engine_state() {
    let h = harness();
    let _ = h.engine.add_task(TaskKind::SendFarm, Default::default(), 4, Some("v1".into()));
    let status = h.engine.status();

    assert_eq!(status.server, server());
    assert_eq!(status.state, BotState::Stopped);
    assert_eq!(status.queue_len, 1);
    assert_eq!(status.pending_tasks, 1);
    assert_eq!(status.max_actions_per_hour, 60);
    assert_eq!(status.tab, Some(TAB));
}

#[test]
fn queue_accessors_roundtrip() {
    let h = harness();
    let id = h
        .engine
        .add_task(TaskKind::Navigate, Default::default(), 5, None)
        .unwrap_or_else(|| panic!("add failed"));
    assert_eq!(h.engine.queue_tasks().len(), 1);

    assert!(h.engine.remove_task(id));
    assert!(h.engine.queue_tasks().is_empty());

    let _ = h.engine.add_task(TaskKind::Navigate, Default::default(), 5, None);
    h.engine.clear_queue();
    assert!(h.engine.queue_tasks().is_empty());
}

#[tokio::test]
async fn run_driver_fires_cycles() {
    tokio::time::pause();
    let h = started_harness().await;
    let engine = h.engine.clone();
    let cancel = tokio_util::sync::CancellationToken::new();
    let driver = {
        let cancel = cancel.clone();
        let engine = engine.clone();
        tokio::spawn(async move { engine.run(cancel).await })
    };

    // Let the driver poll a few rounds; the fake clock never advances,
    // so nothing fires, but the loop must stay alive and cancellable.
    tokio::time::sleep(std::time::Duration::from_secs(30)).await;
    assert!(!driver.is_finished());

    cancel.cancel();
    let _ = driver.await;
}
