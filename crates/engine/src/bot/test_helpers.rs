// SPDX-License-Identifier: MIT

//! Shared harness for engine tests: fake transport, scripted strategy,
//! fake clock, in-memory storage.

use super::{BotEngine, EngineDeps};
use crate::test_support::{FakeStrategy, FakeTransport};
use reeve_core::{BotConfig, FakeClock, ServerKey};
use reeve_storage::{BotLogger, ConfigStore, MemoryBackend, Storage};
use std::sync::Arc;

pub(crate) const TAB: crate::transport::TabId = 17;

pub(crate) type TestEngine = BotEngine<FakeTransport, Arc<FakeStrategy>, FakeClock>;

pub(crate) struct Harness {
    pub engine: Arc<TestEngine>,
    pub transport: Arc<FakeTransport>,
    pub strategy: Arc<FakeStrategy>,
    pub clock: FakeClock,
    pub storage: Storage,
    pub logger: BotLogger<FakeClock>,
}

/// Config with zeroed human delays so tests run instantly.
pub(crate) fn fast_config() -> BotConfig {
    let mut config = BotConfig::default();
    config.enabled = true;
    config.delays.action_min_ms = 0;
    config.delays.action_max_ms = 0;
    config
}

pub(crate) fn server() -> ServerKey {
    ServerKey::new("ts1.example.com")
}

/// A fresh engine bound to a live tab, not yet started.
pub(crate) fn harness() -> Harness {
    let clock = FakeClock::new();
    let storage = Storage::new(MemoryBackend::new());
    let transport = Arc::new(FakeTransport::new());
    let strategy = Arc::new(FakeStrategy::new());
    let logger = BotLogger::new(storage.clone(), clock.clone());
    let engine = Arc::new(BotEngine::new(EngineDeps {
        server: server(),
        transport: transport.clone(),
        strategy: strategy.clone(),
        storage: storage.clone(),
        logger: logger.clone(),
        clock: clock.clone(),
    }));
    engine.bind_tab(TAB);
    Harness { engine, transport, strategy, clock, storage, logger }
}

/// An engine over existing storage, as after a host restart.
pub(crate) fn harness_with_storage(storage: Storage, clock: FakeClock) -> Harness {
    let transport = Arc::new(FakeTransport::new());
    let strategy = Arc::new(FakeStrategy::new());
    let logger = BotLogger::new(storage.clone(), clock.clone());
    let engine = Arc::new(BotEngine::new(EngineDeps {
        server: server(),
        transport: transport.clone(),
        strategy: strategy.clone(),
        storage: storage.clone(),
        logger: logger.clone(),
        clock: clock.clone(),
    }));
    engine.bind_tab(TAB);
    Harness { engine, transport, strategy, clock, storage, logger }
}

/// A started engine with the fast config persisted and history loaded.
pub(crate) async fn started_harness() -> Harness {
    let h = harness();
    ConfigStore::new(h.storage.clone())
        .save(&server(), &fast_config(), &h.clock)
        .await
        .unwrap_or_else(|e| panic!("config save failed: {e}"));
    h.logger.load_history().await.unwrap_or_else(|e| panic!("history load failed: {e}"));
    h.engine.start().await.unwrap_or_else(|e| panic!("start failed: {e}"));
    h
}
