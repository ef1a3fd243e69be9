// SPDX-License-Identifier: MIT

use super::*;
use crate::backend::MemoryBackend;
use crate::registry::RegistryStore;
use reeve_core::FakeClock;
use serde_json::json;

fn setup() -> (ConfigStore, Storage, FakeClock) {
    let storage = Storage::new(MemoryBackend::new());
    (ConfigStore::new(storage.clone()), storage, FakeClock::new())
}

#[tokio::test]
async fn load_missing_gives_template() {
    let (store, _, _) = setup();
    let config = store.load(&ServerKey::new("s1")).await.unwrap();
    assert_eq!(config, BotConfig::default());
}

#[tokio::test]
async fn load_merges_old_record_with_template() {
    let (store, storage, _) = setup();
    let server = ServerKey::new("s1");
    storage
        .set(&config_key(&server), json!({"enabled": 1, "safety": {"max_breaker_trips": 7}}))
        .await
        .unwrap();

    let config = store.load(&server).await.unwrap();
    assert!(config.enabled);
    assert_eq!(config.safety.max_breaker_trips, 7);
    // Template fills the rest of the subtree
    assert_eq!(config.safety.hero_low_pct, 20);
}

#[tokio::test]
async fn save_touches_registry() {
    let (store, storage, clock) = setup();
    let server = ServerKey::new("s1.example.com");
    clock.set_epoch_ms(5_000);

    store.save(&server, &BotConfig::default(), &clock).await.unwrap();

    let registry = RegistryStore::new(storage).load().await.unwrap();
    assert_eq!(registry.servers[&server].last_used_at_ms, 5_000);
}

#[tokio::test]
async fn saves_from_two_servers_both_land_in_registry() {
    let (store, storage, clock) = setup();
    let s1 = ServerKey::new("s1.example.com");
    let s2 = ServerKey::new("s2.example.com");

    let cfg1 = BotConfig::default();
    let cfg2 = BotConfig::default();
    let (a, b) = tokio::join!(
        store.save(&s1, &cfg1, &clock),
        store.save(&s2, &cfg2, &clock),
    );
    a.unwrap();
    b.unwrap();

    let registry = RegistryStore::new(storage).load().await.unwrap();
    assert_eq!(registry.servers.len(), 2);
}
