// SPDX-License-Identifier: MIT

use super::*;
use crate::backend::MemoryBackend;
use reeve_core::FakeClock;
use serde_json::json;

fn setup() -> (BotLogger<FakeClock>, Storage, FakeClock) {
    let storage = Storage::new(MemoryBackend::new());
    let clock = FakeClock::new();
    (BotLogger::new(storage.clone(), clock.clone()), storage, clock)
}

#[tokio::test]
async fn entries_carry_current_server_tag() {
    let (logger, _, _) = setup();
    logger.load_history().await.unwrap();

    logger.info("untagged", None);
    logger.set_server(Some(ServerKey::new("s1")));
    logger.warn("tagged", Some(json!({"cycle": 3})));

    let all = logger.entries(None);
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].server, None);
    assert_eq!(all[1].server, Some(ServerKey::new("s1")));
    assert_eq!(all[1].level, LogLevel::Warn);
}

#[tokio::test]
async fn flush_writes_legacy_and_per_server_slices() {
    let (logger, storage, _) = setup();
    logger.load_history().await.unwrap();

    logger.set_server(Some(ServerKey::new("s1")));
    logger.info("one", None);
    logger.set_server(Some(ServerKey::new("s2")));
    logger.info("two", None);
    logger.flush().await.unwrap();

    let legacy: Vec<LogEntry> = storage.get_typed(LEGACY_LOGS_KEY).await.unwrap().unwrap();
    assert_eq!(legacy.len(), 2);

    let s1: Vec<LogEntry> =
        storage.get_typed(&logs_key(&ServerKey::new("s1"))).await.unwrap().unwrap();
    assert_eq!(s1.len(), 1);
    assert_eq!(s1[0].message, "one");
}

#[tokio::test]
async fn flush_before_history_load_is_refused() {
    let (logger, storage, _) = setup();
    storage
        .set_typed(
            LEGACY_LOGS_KEY,
            &vec![LogEntry {
                at: "2026-01-01T00:00:00Z".into(),
                level: LogLevel::Info,
                message: "history".into(),
                data: None,
                server: None,
            }],
        )
        .await
        .unwrap();

    logger.info("fresh", None);
    // Without the guard this would clobber the stored history
    logger.flush().await.unwrap();
    let stored: Vec<LogEntry> = storage.get_typed(LEGACY_LOGS_KEY).await.unwrap().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].message, "history");
}

#[tokio::test]
async fn history_load_prepends_stored_entries() {
    let (logger, storage, _) = setup();
    storage
        .set_typed(
            LEGACY_LOGS_KEY,
            &vec![LogEntry {
                at: "2026-01-01T00:00:00Z".into(),
                level: LogLevel::Info,
                message: "old".into(),
                data: None,
                server: None,
            }],
        )
        .await
        .unwrap();

    logger.info("new", None);
    logger.load_history().await.unwrap();

    let messages: Vec<_> = logger.entries(None).into_iter().map(|e| e.message).collect();
    assert_eq!(messages, ["old", "new"]);
}

#[test]
fn timestamps_come_from_the_clock() {
    let storage = Storage::new(MemoryBackend::new());
    let clock = FakeClock::new();
    clock.set_epoch_ms(1_700_000_000_000);
    let logger = BotLogger::new(storage, clock);

    logger.info("stamped", None);
    let entry = &logger.entries(None)[0];
    assert!(entry.at.starts_with("2023-11-14T"));
}
