// SPDX-License-Identifier: MIT

use super::*;
use crate::clock::FakeClock;
use crate::test_support::strategies::*;
use crate::test_support::{field_params, slot_params};
use proptest::prelude::*;

fn queue() -> (TaskQueue<FakeClock>, FakeClock) {
    let clock = FakeClock::new();
    (TaskQueue::new(clock.clone()), clock)
}

#[test]
fn add_assigns_monotonic_ids() {
    let (mut q, _clock) = queue();
    let a = q.add(TaskKind::Navigate, TaskParams::default(), 5, None, None).unwrap();
    let b = q.add(TaskKind::SendAttack, TaskParams::default(), 5, None, None).unwrap();
    assert!(b > a);
}

#[test]
fn duplicate_build_add_returns_none() {
    let (mut q, _clock) = queue();
    let first = q.add(TaskKind::UpgradeBuilding, slot_params(26), 5, Some("v1".into()), None);
    let second = q.add(TaskKind::UpgradeBuilding, slot_params(26), 5, Some("v1".into()), None);

    assert!(first.is_some());
    assert!(second.is_none());
    assert_eq!(q.len(), 1);
}

#[test]
fn duplicate_allowed_after_terminal() {
    let (mut q, _clock) = queue();
    let id = q.add(TaskKind::UpgradeResource, field_params(3), 5, Some("v1".into()), None).unwrap();
    q.get_next().unwrap();
    q.mark_completed(id);

    assert!(q.add(TaskKind::UpgradeResource, field_params(3), 5, Some("v1".into()), None).is_some());
}

#[test]
fn get_next_orders_by_priority_then_age() {
    let (mut q, clock) = queue();
    let _ = q.add(TaskKind::SendFarm, TaskParams::default(), 7, Some("v1".into()), None).unwrap();
    clock.advance_secs(1);
    let urgent = q.add(TaskKind::SendAttack, TaskParams::default(), 2, None, None).unwrap();
    clock.advance_secs(1);
    let _ = q.add(TaskKind::Navigate, TaskParams::default(), 2, None, None).unwrap();

    let next = q.get_next().unwrap();
    assert_eq!(next.id, urgent);
    assert_eq!(next.status, TaskStatus::Running);
    assert!(next.started_at_ms.is_some());
}

#[test]
fn get_next_skips_scheduled_future_tasks() {
    let (mut q, clock) = queue();
    let later = clock.epoch_ms() + 60_000;
    let _ = q.add(TaskKind::SendFarm, TaskParams::default(), 1, None, Some(later)).unwrap();

    assert!(q.get_next().is_none());
    clock.advance_secs(61);
    assert!(q.get_next().is_some());
}

#[test]
fn peek_does_not_claim() {
    let (mut q, _clock) = queue();
    let _ = q.add(TaskKind::Navigate, TaskParams::default(), 5, None, None).unwrap();
    assert_eq!(q.peek().unwrap().status, TaskStatus::Pending);
    assert_eq!(q.peek().unwrap().status, TaskStatus::Pending);
}

#[test]
fn mark_failed_retries_until_cap() {
    let (mut q, _clock) = queue();
    let id = q.add(TaskKind::TrainTroops, TaskParams::default(), 5, Some("v1".into()), None).unwrap();

    for attempt in 1..DEFAULT_MAX_RETRIES {
        q.get_next().unwrap();
        q.mark_failed(id, "boom");
        let task = q.get(id).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retries, attempt);
    }

    q.get_next().unwrap();
    q.mark_failed(id, "boom");
    let task = q.get(id).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.retries, DEFAULT_MAX_RETRIES);

    // Terminal: no further transitions
    assert!(q.get_next().is_none());
}

#[test]
fn terminal_tasks_evicted_after_ttl() {
    let (mut q, clock) = queue();
    let old = q.add(TaskKind::Navigate, TaskParams::default(), 5, None, None).unwrap();
    q.get_next().unwrap();
    q.mark_completed(old);

    clock.advance(TERMINAL_TASK_TTL + std::time::Duration::from_secs(1));
    let recent = q.add(TaskKind::SendFarm, TaskParams::default(), 5, None, None).unwrap();
    q.get_next().unwrap();
    q.mark_completed(recent);

    assert!(q.get(old).is_none());
    assert!(q.get(recent).is_some());
}

#[test]
fn stuck_running_task_requeued_with_retry() {
    let (mut q, clock) = queue();
    let id = q.add(TaskKind::SendFarm, TaskParams::default(), 5, Some("v1".into()), None).unwrap();
    q.get_next().unwrap();
    assert_eq!(q.get(id).unwrap().status, TaskStatus::Running);

    // Past MAX_RUNNING_AGE: recovery flips it back to pending
    clock.advance(MAX_RUNNING_AGE + std::time::Duration::from_secs(10));
    assert!(q.get_next().is_some());
    let task = q.get(id).unwrap();
    assert_eq!(task.retries, 1);
}

#[test]
fn stuck_recovery_is_throttled() {
    let (mut q, clock) = queue();
    let id = q.add(TaskKind::SendFarm, TaskParams::default(), 5, None, None).unwrap();
    // Claims the task and runs the first recovery pass
    q.get_next().unwrap();

    // Backdate the start so the task is unambiguously stuck
    q.update(id, |t| t.started_at_ms = Some(0));

    // Within the throttle window: recovery does not run
    clock.advance_secs(10);
    assert!(q.get_next().is_none());
    assert_eq!(q.get(id).unwrap().status, TaskStatus::Running);

    // Window elapsed: recovery requeues and get_next claims it again
    clock.advance_secs(25);
    assert_eq!(q.get_next().unwrap().id, id);
    assert_eq!(q.get(id).unwrap().retries, 1);
}

#[test]
fn stuck_task_at_cap_fails() {
    let (mut q, clock) = queue();
    let id = q.add(TaskKind::SendFarm, TaskParams::default(), 5, None, None).unwrap();
    q.update(id, |t| t.retries = DEFAULT_MAX_RETRIES - 1);
    q.get_next().unwrap();

    clock.advance(MAX_RUNNING_AGE + std::time::Duration::from_secs(10));
    q.get_next();
    let task = q.get(id).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error.as_deref().unwrap_or("").contains("stuck"));
}

#[test]
fn dirty_bit_tracks_mutations() {
    let (mut q, clock) = queue();
    assert_eq!(q.dirty_at(), 0);

    let _ = q.add(TaskKind::Navigate, TaskParams::default(), 5, None, None).unwrap();
    assert!(q.dirty_at() > 0);

    q.mark_clean();
    assert_eq!(q.dirty_at(), 0);

    clock.advance_secs(1);
    q.get_next().unwrap();
    assert_eq!(q.dirty_at(), clock.epoch_ms());
}

#[test]
fn restore_resets_running_to_pending() {
    let (mut q, _clock) = queue();
    let tasks = vec![
        Task::builder().id(7).status(TaskStatus::Running).started_at_ms(1u64).build(),
        Task::builder().id(9).status(TaskStatus::Completed).build(),
    ];
    q.restore(tasks);

    assert_eq!(q.get(7).unwrap().status, TaskStatus::Pending);
    assert_eq!(q.get(9).unwrap().status, TaskStatus::Completed);
    assert_eq!(q.dirty_at(), 0);

    // Fresh ids continue past the restored ones
    let id = q.add(TaskKind::Navigate, TaskParams::default(), 5, None, None).unwrap();
    assert_eq!(id, 10);
}

#[test]
fn type_queries_see_only_non_terminal() {
    let (mut q, _clock) = queue();
    let id = q.add(TaskKind::SendFarm, TaskParams::default(), 5, Some("v1".into()), None).unwrap();
    assert!(q.has_task_of_type(TaskKind::SendFarm, Some("v1")));
    assert!(q.has_any_task_of_type(TaskKind::SendFarm));
    assert!(!q.has_task_of_type(TaskKind::SendFarm, Some("v2")));

    q.get_next().unwrap();
    q.mark_completed(id);
    assert!(!q.has_any_task_of_type(TaskKind::SendFarm));
}

#[test]
fn clear_completed_keeps_live_tasks() {
    let (mut q, _clock) = queue();
    let done = q.add(TaskKind::Navigate, TaskParams::default(), 5, None, None).unwrap();
    q.get_next().unwrap();
    q.mark_completed(done);
    let _ = q.add(TaskKind::SendFarm, TaskParams::default(), 5, None, None).unwrap();

    q.clear_completed();
    assert_eq!(q.len(), 1);
    assert!(q.has_any_task_of_type(TaskKind::SendFarm));
}

#[test]
fn priority_clamped_to_range() {
    let (mut q, _clock) = queue();
    let id = q.add(TaskKind::Navigate, TaskParams::default(), 0, None, None).unwrap();
    assert_eq!(q.get(id).unwrap().priority, 1);
    let id = q.add(TaskKind::SendFarm, TaskParams::default(), 99, None, None).unwrap();
    assert_eq!(q.get(id).unwrap().priority, 10);
}

proptest! {
    // get_next always returns a least (priority, created_at) ready task
    #[test]
    fn next_is_minimal_among_ready(
        priorities in proptest::collection::vec(arb_priority(), 1..20),
    ) {
        let clock = FakeClock::new();
        let mut q = TaskQueue::new(clock.clone());
        for (i, priority) in priorities.iter().enumerate() {
            // Distinct kinds/villages to sidestep dedup
            let _ = q.add(
                TaskKind::Navigate,
                TaskParams::default(),
                *priority,
                Some(format!("v{}", i)),
                None,
            );
            clock.advance(std::time::Duration::from_millis(1));
        }
        let best = q
            .get_all()
            .iter()
            .map(|t| (t.priority, t.created_at_ms))
            .min()
            .unwrap();
        let next = q.get_next().unwrap();
        prop_assert_eq!((next.priority, next.created_at_ms), best);
    }

    // At most one non-terminal task per build dedup key
    #[test]
    fn dedup_invariant_holds(
        targets in proptest::collection::vec(1u32..5, 1..30),
    ) {
        let clock = FakeClock::new();
        let mut q = TaskQueue::new(clock.clone());
        for target in targets {
            let _ = q.add(
                TaskKind::UpgradeResource,
                crate::test_support::field_params(target),
                5,
                Some("v1".into()),
                None,
            );
        }
        for target in 1u32..5 {
            let live = q
                .get_all()
                .iter()
                .filter(|t| {
                    !t.status.is_terminal() && t.params.field_id == Some(target)
                })
                .count();
            prop_assert!(live <= 1);
        }
    }
}
