// SPDX-License-Identifier: MIT

//! The instance registry: one engine per server, created lazily, with an
//! inverse tab index and the tab-binding policy.

use indexmap::IndexMap;
use parking_lot::Mutex;
use reeve_core::{Clock, ServerKey};
use reeve_engine::{BotEngine, EngineDeps, PageTransport, Strategy, TabId};
use reeve_storage::{BotLogger, Storage};
use std::collections::HashMap;
use std::sync::Arc;

/// Outcome of applying the tab-binding policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabBinding {
    /// The tab now owns the instance.
    Bound,
    /// A running engine keeps its tab; the newcomer is turned away.
    RejectedRunning,
    /// The stopped engine's old tab is still alive; nothing changes.
    SkippedOldTabAlive,
}

/// What a new engine needs, shared across all instances.
pub struct ManagerDeps<T, S, C: Clock> {
    pub transport: Arc<T>,
    pub strategy: S,
    pub storage: Storage,
    pub logger: BotLogger<C>,
    pub clock: C,
}

/// Registry of instances keyed by server, in creation order.
///
/// Creation order matters: the legacy heartbeat alarm (no server in its
/// name) resolves to the first running instance in this order.
pub struct InstanceManager<T: PageTransport, S: Strategy, C: Clock> {
    deps: ManagerDeps<T, S, C>,
    instances: Mutex<IndexMap<ServerKey, Arc<BotEngine<T, S, C>>>>,
    tab_index: Mutex<HashMap<TabId, ServerKey>>,
}

impl<T, S, C> InstanceManager<T, S, C>
where
    T: PageTransport,
    S: Strategy + Clone,
    C: Clock,
{
    pub fn new(deps: ManagerDeps<T, S, C>) -> Self {
        Self { deps, instances: Mutex::new(IndexMap::new()), tab_index: Mutex::new(HashMap::new()) }
    }

    pub fn get(&self, server: &ServerKey) -> Option<Arc<BotEngine<T, S, C>>> {
        self.instances.lock().get(server).cloned()
    }

    pub fn get_by_tab(&self, tab: TabId) -> Option<Arc<BotEngine<T, S, C>>> {
        let server = self.tab_index.lock().get(&tab).cloned()?;
        self.get(&server)
    }

    /// The instance for `server`, created on first reference.
    pub fn get_or_create(&self, server: &ServerKey) -> Arc<BotEngine<T, S, C>> {
        let mut instances = self.instances.lock();
        if let Some(engine) = instances.get(server) {
            return engine.clone();
        }
        tracing::info!(server = %server, "creating instance");
        let engine = Arc::new(BotEngine::new(EngineDeps {
            server: server.clone(),
            transport: self.deps.transport.clone(),
            strategy: self.deps.strategy.clone(),
            storage: self.deps.storage.clone(),
            logger: self.deps.logger.clone(),
            clock: self.deps.clock.clone(),
        }));
        instances.insert(server.clone(), engine.clone());
        engine
    }

    /// All instances, in creation order.
    pub fn list(&self) -> Vec<Arc<BotEngine<T, S, C>>> {
        self.instances.lock().values().cloned().collect()
    }

    pub fn servers(&self) -> Vec<ServerKey> {
        self.instances.lock().keys().cloned().collect()
    }

    /// The first running instance in creation order, for the legacy
    /// un-keyed heartbeat alarm.
    pub fn first_running(&self) -> Option<Arc<BotEngine<T, S, C>>> {
        self.instances.lock().values().find(|e| e.running()).cloned()
    }

    /// Apply the tab-binding policy for a tab claiming `server`.
    ///
    /// `old_tab_alive` reports whether the currently bound tab was
    /// verified to still exist (only consulted for stopped engines).
    pub fn bind_tab(&self, server: &ServerKey, tab: TabId, old_tab_alive: bool) -> TabBinding {
        let engine = self.get_or_create(server);
        let old = engine.tab();
        match old {
            Some(old_tab) if old_tab == tab => TabBinding::Bound,
            // A running engine's tab cannot be stolen
            Some(_) if engine.running() => {
                tracing::warn!(server = %server, tab, "tab rejected: instance is running on another tab");
                TabBinding::RejectedRunning
            }
            Some(old_tab) => {
                if old_tab_alive {
                    tracing::debug!(server = %server, tab, old_tab, "tab skipped: old tab still alive");
                    return TabBinding::SkippedOldTabAlive;
                }
                self.rebind(server, Some(old_tab), tab);
                engine.bind_tab(tab);
                TabBinding::Bound
            }
            None => {
                self.rebind(server, None, tab);
                engine.bind_tab(tab);
                TabBinding::Bound
            }
        }
    }

    /// Drop a tab's binding (tab closed). Returns the owning engine.
    pub fn unbind_tab(&self, tab: TabId) -> Option<Arc<BotEngine<T, S, C>>> {
        let server = self.tab_index.lock().remove(&tab)?;
        let engine = self.get(&server)?;
        if engine.tab() == Some(tab) {
            engine.unbind_tab();
        }
        Some(engine)
    }

    pub async fn stop_all(&self) {
        for engine in self.list() {
            if engine.running() {
                if let Err(err) = engine.stop().await {
                    tracing::warn!(server = %engine.server(), error = %err, "stop failed");
                }
            }
        }
    }

    fn rebind(&self, server: &ServerKey, old: Option<TabId>, new: TabId) {
        let mut index = self.tab_index.lock();
        if let Some(old) = old {
            if index.get(&old) == Some(server) {
                index.remove(&old);
            }
        }
        index.insert(new, server.clone());
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
