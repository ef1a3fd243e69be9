// SPDX-License-Identifier: MIT

use super::*;
use crate::backend::MemoryBackend;
use reeve_core::BotStats;

fn store() -> RunStateStore {
    RunStateStore::new(Storage::new(MemoryBackend::new()))
}

#[tokio::test]
async fn run_state_roundtrip() {
    let store = store();
    let server = ServerKey::new("s1");
    assert!(store.load(&server).await.unwrap().is_none());

    let state = PersistedRunState {
        stats: BotStats { tasks_completed: 3, ..Default::default() },
        actions_this_hour: 3,
        hour_reset_at_ms: 1_000,
        was_running: true,
        saved_at_ms: 2_000,
        ..Default::default()
    };
    store.save(&server, &state).await.unwrap();

    let loaded = store.load(&server).await.unwrap().unwrap();
    assert_eq!(loaded, state);
}

#[tokio::test]
async fn states_are_per_server() {
    let store = store();
    let state = PersistedRunState { was_running: true, ..Default::default() };
    store.save(&ServerKey::new("s1"), &state).await.unwrap();

    assert!(store.load(&ServerKey::new("s2")).await.unwrap().is_none());
}

#[tokio::test]
async fn emergency_record_freshness_window() {
    let store = store();
    let record = EmergencyRecord { reason: "Captcha detected on page".into(), at_ms: 1_000_000 };
    store.save_emergency(&record).await.unwrap();

    // Within the hour: preferred
    let fresh = store.fresh_emergency(1_000_000 + 10_000).await.unwrap();
    assert_eq!(fresh.unwrap().reason, "Captcha detected on page");

    // Stale after the window
    let stale = store.fresh_emergency(1_000_000 + EmergencyRecord::FRESH_WINDOW_MS).await.unwrap();
    assert!(stale.is_none());
}

#[tokio::test]
async fn clear_emergency_removes_record() {
    let store = store();
    store
        .save_emergency(&EmergencyRecord { reason: "x".into(), at_ms: 1 })
        .await
        .unwrap();
    store.clear_emergency().await.unwrap();
    assert!(store.fresh_emergency(2).await.unwrap().is_none());
}
