// SPDX-License-Identifier: MIT

//! Request dispatch and instance lifecycle.
//!
//! Every external stimulus lands here: operator commands from the socket
//! listener, page commands and tab events from the WebSocket bridge, and
//! per-server wake-up alarms. The supervisor resolves each one to an
//! instance and keeps the engines alive across host restarts.

use crate::api::FarmListApi;
use crate::heartbeat::{alarm_name, parse_alarm, AlarmTarget, HeartbeatSet};
use crate::manager::{InstanceManager, TabBinding};
use crate::notify;
use crate::protocol::{Request, Response, ServerSummary};
use crate::ws::PageEvent;
use parking_lot::Mutex;
use reeve_core::{BotConfig, Clock, PageAction, ServerKey, TaskParams};
use reeve_engine::{BotEngine, PageTransport, Strategy, TabId};
use reeve_storage::{BotLogger, ConfigStore, RegistryStore, RunStateStore, Storage};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Grace before a detached executor is treated as a closed tab.
const TAB_GONE_GRACE: Duration = Duration::from_secs(60);

/// Where a request came from; decides how it resolves to an instance.
#[derive(Debug, Clone, Copy)]
pub enum RequestOrigin {
    Operator,
    Page { tab: TabId },
}

pub struct Supervisor<T: PageTransport, S: Strategy, C: Clock> {
    manager: Arc<InstanceManager<T, S, C>>,
    transport: Arc<T>,
    storage: Storage,
    logger: BotLogger<C>,
    clock: C,
    api: FarmListApi,
    heartbeats: HeartbeatSet,
    alarms_rx: Mutex<Option<mpsc::Receiver<String>>>,
    /// Driver cancellation tokens for started engines.
    drivers: Mutex<HashMap<ServerKey, CancellationToken>>,
    /// Servers whose latched emergency was already announced.
    announced_emergencies: Mutex<HashMap<ServerKey, String>>,
    shutdown: CancellationToken,
}

impl<T, S, C> Supervisor<T, S, C>
where
    T: PageTransport,
    S: Strategy + Clone,
    C: Clock + 'static,
{
    pub fn new(
        manager: Arc<InstanceManager<T, S, C>>,
        transport: Arc<T>,
        storage: Storage,
        logger: BotLogger<C>,
        clock: C,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let (alarms_tx, alarms_rx) = mpsc::channel(16);
        Arc::new(Self {
            manager,
            transport,
            storage,
            logger,
            clock,
            api: FarmListApi::new(),
            heartbeats: HeartbeatSet::new(alarms_tx),
            alarms_rx: Mutex::new(Some(alarms_rx)),
            drivers: Mutex::new(HashMap::new()),
            announced_emergencies: Mutex::new(HashMap::new()),
            shutdown,
        })
    }

    /// Consume alarm firings until cancelled.
    pub async fn run_alarms(self: Arc<Self>) {
        let receiver = self.alarms_rx.lock().take();
        let Some(mut receiver) = receiver else { return };
        loop {
            let name = tokio::select! {
                _ = self.shutdown.cancelled() => return,
                name = receiver.recv() => match name {
                    Some(name) => name,
                    None => return,
                },
            };
            self.handle_alarm(&name).await;
        }
    }

    /// Startup reconciliation: re-arm heartbeats for servers that were
    /// running when the previous process died, so their alarms can
    /// auto-restart the engines once their tabs reconnect.
    pub async fn reconcile_persisted(&self) {
        let registry = match RegistryStore::new(self.storage.clone()).load().await {
            Ok(registry) => registry,
            Err(err) => {
                tracing::warn!(error = %err, "registry load failed during reconciliation");
                return;
            }
        };
        let run_store = RunStateStore::new(self.storage.clone());
        for server in registry.servers.keys() {
            match run_store.load(server).await {
                Ok(Some(state)) if state.was_running => {
                    tracing::info!(server = %server, "was running before restart; arming heartbeat");
                    self.manager.get_or_create(server);
                    self.start_heartbeat(server);
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(server = %server, error = %err, "run state load failed");
                }
            }
        }
    }

    /// Consume page events from the WebSocket bridge until cancelled.
    pub async fn run_events(self: Arc<Self>, mut events: mpsc::Receiver<PageEvent>) {
        loop {
            let event = tokio::select! {
                _ = self.shutdown.cancelled() => return,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => return,
                },
            };
            match event {
                PageEvent::TabUpdated { tab, url } => self.handle_tab_updated(tab, &url).await,
                PageEvent::ExecutorDetached { tab } => {
                    let supervisor = self.clone();
                    tokio::spawn(async move {
                        supervisor.watch_detached_tab(tab).await;
                    });
                }
                PageEvent::Command { tab, request, reply } => {
                    let response =
                        self.handle_request(request, RequestOrigin::Page { tab }).await;
                    let _ = reply.send(response);
                }
            }
        }
    }

    /// A tab's executor announced itself on `url`.
    pub async fn handle_tab_updated(&self, tab: TabId, url: &str) {
        let server = ServerKey::from_url(url);
        if server.is_unknown() {
            tracing::debug!(tab, url, "tab update with no usable hostname ignored");
            return;
        }
        let old_tab_alive = match self.manager.get(&server).and_then(|e| e.tab()) {
            Some(old) if old != tab => self.transport.tab_exists(old).await,
            _ => false,
        };
        match self.manager.bind_tab(&server, tab, old_tab_alive) {
            TabBinding::Bound => tracing::debug!(tab, server = %server, "tab bound"),
            TabBinding::RejectedRunning | TabBinding::SkippedOldTabAlive => {}
        }
    }

    /// An executor detached; after the grace period with no reconnect the
    /// tab is treated as closed.
    async fn watch_detached_tab(&self, tab: TabId) {
        tokio::time::sleep(TAB_GONE_GRACE).await;
        if self.transport.tab_exists(tab).await {
            return;
        }
        self.handle_tab_removed(tab).await;
    }

    /// The tab is gone for real: untether the instance, stop it if it
    /// was running, and tell the operator.
    pub async fn handle_tab_removed(&self, tab: TabId) {
        let Some(engine) = self.manager.unbind_tab(tab) else { return };
        let server = engine.server().clone();
        if !engine.running() {
            return;
        }
        tracing::warn!(server = %server, tab, "bound tab closed while running; stopping");
        if let Err(err) = engine.stop().await {
            tracing::warn!(server = %server, error = %err, "stop after tab loss failed");
        }
        self.stop_heartbeat(&server);
        notify::operator(
            "Reeve stopped",
            &format!("{server}: the game tab closed; the bot was stopped"),
        );
    }

    /// A wake-up alarm fired.
    pub async fn handle_alarm(&self, name: &str) {
        let engine = match parse_alarm(name) {
            Some(AlarmTarget::Server(server)) => self.manager.get(&server),
            // Legacy alarm with no server: first running instance wins
            Some(AlarmTarget::Legacy) => self.manager.first_running(),
            None => {
                tracing::warn!(alarm = name, "unknown alarm ignored");
                return;
            }
        };
        let Some(engine) = engine else { return };
        let server = engine.server().clone();

        self.announce_emergency(&engine).await;

        if engine.running() {
            engine.heartbeat().await;
            return;
        }

        // Stopped engine: auto-restart if persisted state says it should
        // be running and the tab is still around
        let state = RunStateStore::new(self.storage.clone()).load(&server).await;
        let should_run = matches!(state, Ok(Some(ref s)) if s.was_running);
        if !should_run || engine.emergency_stopped() {
            return;
        }
        let tab_alive = match engine.tab() {
            Some(tab) => self.transport.tab_exists(tab).await,
            None => false,
        };
        if !tab_alive {
            tracing::info!(server = %server, "no live tab for auto-restart; clearing alarm");
            self.stop_heartbeat(&server);
            return;
        }
        tracing::info!(server = %server, "auto-restarting after host restart");
        if let Err(err) = self.start_instance(&server).await {
            tracing::warn!(server = %server, error = %err, "auto-restart failed");
        }
    }

    /// Dispatch one external request.
    pub async fn handle_request(&self, request: Request, origin: RequestOrigin) -> Response {
        match request {
            Request::GetServers => self.get_servers().await,
            Request::GetStatus { server } => match self.resolve(server, origin) {
                Some(engine) => {
                    self.announce_emergency(&engine).await;
                    let mut status = serde_json::to_value(engine.status()).unwrap_or(Value::Null);
                    if let Some(reason) = engine.emergency_reason().await {
                        status["emergency_reason"] = json!(reason);
                    }
                    Response::ok(status)
                }
                None => Response::err("no such instance"),
            },
            Request::StartBot { server } => match self.start_instance(&server).await {
                Ok(()) => Response::ok_empty(),
                Err(err) => Response::err(err),
            },
            Request::StopBot { server } => match self.manager.get(&server) {
                Some(engine) => {
                    self.stop_heartbeat(&server);
                    match engine.stop().await {
                        Ok(()) => Response::ok_empty(),
                        Err(err) => Response::err(err.to_string()),
                    }
                }
                None => Response::err("no such instance"),
            },
            Request::PauseBot { server, pause } => match self.manager.get(&server) {
                Some(engine) => {
                    let changed = if pause { engine.pause() } else { engine.resume() };
                    if changed {
                        Response::ok_empty()
                    } else {
                        Response::err("state change rejected")
                    }
                }
                None => Response::err("no such instance"),
            },
            Request::EmergencyStop { server, reason } => match self.manager.get(&server) {
                Some(engine) => {
                    let reason = reason.unwrap_or_else(|| "Operator emergency stop".to_string());
                    engine.emergency_stop(&reason).await;
                    self.stop_heartbeat(&server);
                    Response::ok_empty()
                }
                None => Response::err("no such instance"),
            },
            Request::SaveConfig { server, config } => {
                let config = BotConfig::from_stored(config);
                let store = ConfigStore::new(self.storage.clone());
                match store.save(&server, &config, &self.clock).await {
                    Ok(()) => {
                        // A live engine picks the new config up immediately
                        if let Some(engine) = self.manager.get(&server) {
                            engine.apply_config(config);
                        }
                        Response::ok_empty()
                    }
                    Err(err) => Response::err(err.to_string()),
                }
            }
            Request::GetLogs { server } => {
                let entries = self.logger.entries(server.as_ref());
                Response::ok(entries)
            }
            Request::GetQueue { server } => match self.manager.get(&server) {
                Some(engine) => Response::ok(engine.queue_tasks()),
                None => Response::err("no such instance"),
            },
            Request::AddTask { server, kind, params, priority, village_id } => {
                let engine = self.manager.get_or_create(&server);
                match engine.add_task(kind, TaskParams::from_value(params), priority, village_id) {
                    Some(id) => Response::ok(json!({"id": id})),
                    None => Response::err("duplicate task"),
                }
            }
            Request::RemoveTask { server, id } => match self.manager.get(&server) {
                Some(engine) if engine.remove_task(id) => Response::ok_empty(),
                Some(_) => Response::err("no such task"),
                None => Response::err("no such instance"),
            },
            Request::ClearQueue { server } => match self.manager.get(&server) {
                Some(engine) => {
                    engine.clear_queue();
                    Response::ok_empty()
                }
                None => Response::err("no such instance"),
            },
            Request::GetStrategy { server } => match self.manager.get(&server) {
                Some(engine) => Response::ok(engine.strategy_info()),
                None => Response::err("no such instance"),
            },
            Request::GetFarmIntel { server } => {
                self.forward_get_state(&server, "farmIntel").await
            }
            Request::RequestScan { server } => self.full_scan(&server).await,
            Request::FarmListApiCall { server, url, body, cookies, version } => {
                // X-Version is an opaque pass-through: request, then
                // config, then the version last seen in a scan
                let version = match version {
                    Some(version) => Some(version),
                    None => self.configured_api_version(&server).await,
                };
                match self.api.post(&url, body, &cookies, version.as_deref()).await {
                    Ok(data) => Response::ok(data),
                    Err(err) => Response::err(err.to_string()),
                }
            }
            Request::SwitchVillage { server, village_id } => {
                self.forward_action(&server, PageAction::SwitchVillage, json!({"villageId": village_id}))
                    .await
            }
            Request::ContentReady { url } => {
                if let RequestOrigin::Page { tab } = origin {
                    self.handle_tab_updated(tab, &url).await;
                    Response::ok_empty()
                } else {
                    Response::err("CONTENT_READY must come from a page")
                }
            }
            Request::ScanFarmTargets { server } => {
                self.forward_action(&server, PageAction::ScanFarmListSlots, Value::Null).await
            }
        }
    }

    async fn get_servers(&self) -> Response {
        let registry = match RegistryStore::new(self.storage.clone()).load().await {
            Ok(registry) => registry,
            Err(err) => return Response::err(err.to_string()),
        };
        let mut rows: Vec<ServerSummary> = Vec::new();
        for (server, entry) in &registry.servers {
            let engine = self.manager.get(server);
            rows.push(ServerSummary {
                server: server.clone(),
                label: entry.label.clone(),
                last_used_at_ms: entry.last_used_at_ms,
                active: engine.is_some(),
                state: engine.as_ref().map(|e| e.fsm_state()),
                tab: engine.as_ref().and_then(|e| e.tab()),
            });
        }
        // Instances not yet in the registry (first run before any save)
        for engine in self.manager.list() {
            if !registry.servers.contains_key(engine.server()) {
                rows.push(ServerSummary {
                    server: engine.server().clone(),
                    label: engine.server().to_string(),
                    last_used_at_ms: 0,
                    active: true,
                    state: Some(engine.fsm_state()),
                    tab: engine.tab(),
                });
            }
        }
        Response::ok(rows)
    }

    /// Start an engine and its driver task plus heartbeat alarm.
    pub async fn start_instance(&self, server: &ServerKey) -> Result<(), String> {
        let engine = self.manager.get_or_create(server);
        if engine.tab().is_none() {
            return Err("no game tab is bound to this server".to_string());
        }
        engine.start().await.map_err(|e| e.to_string())?;

        let cancel = self.shutdown.child_token();
        self.drivers.lock().insert(server.clone(), cancel.clone());
        let driver_engine = engine.clone();
        tokio::spawn(async move {
            driver_engine.run(cancel).await;
        });
        self.start_heartbeat(server);
        Ok(())
    }

    pub async fn shutdown_all(&self) {
        self.heartbeats.stop_all();
        for (_, cancel) in self.drivers.lock().drain() {
            cancel.cancel();
        }
        self.manager.stop_all().await;
        if let Err(err) = self.logger.flush().await {
            tracing::warn!(error = %err, "final log flush failed");
        }
    }

    fn resolve(
        &self,
        server: Option<ServerKey>,
        origin: RequestOrigin,
    ) -> Option<Arc<BotEngine<T, S, C>>> {
        match (server, origin) {
            (Some(server), _) => self.manager.get(&server),
            (None, RequestOrigin::Page { tab }) => self.manager.get_by_tab(tab),
            (None, RequestOrigin::Operator) => None,
        }
    }

    fn start_heartbeat(&self, server: &ServerKey) {
        let name = alarm_name(server);
        self.heartbeats.start(server.clone(), name, self.shutdown.child_token());
    }

    fn stop_heartbeat(&self, server: &ServerKey) {
        self.heartbeats.stop(server);
    }

    /// Surface a latched emergency to the operator exactly once.
    async fn announce_emergency(&self, engine: &Arc<BotEngine<T, S, C>>) {
        if !engine.emergency_stopped() {
            return;
        }
        let server = engine.server().clone();
        let reason = engine.emergency_reason().await.unwrap_or_else(|| "unknown".to_string());
        {
            let mut announced = self.announced_emergencies.lock();
            if announced.get(&server) == Some(&reason) {
                return;
            }
            announced.insert(server.clone(), reason.clone());
        }
        notify::operator("Reeve emergency stop", &format!("{server}: {reason}"));
    }

    async fn configured_api_version(&self, server: &ServerKey) -> Option<String> {
        if let Some(engine) = self.manager.get(server) {
            if let Some(version) = engine.config().farm.api_version {
                return Some(version);
            }
            if let Some(version) = engine.game_state().and_then(|g| g.version) {
                return Some(version);
            }
        }
        None
    }

    async fn forward_action(
        &self,
        server: &ServerKey,
        action: PageAction,
        params: Value,
    ) -> Response {
        let Some(engine) = self.manager.get(server) else {
            return Response::err("no such instance");
        };
        let Some(tab) = engine.tab() else {
            return Response::err("no game tab is bound to this server");
        };
        match engine.bridge().execute(tab, action, params).await {
            Ok(result) if result.success => Response::ok(result.data.unwrap_or(Value::Null)),
            Ok(result) => {
                Response::err(result.reason.or(result.error).unwrap_or_else(|| "failed".into()))
            }
            Err(err) => Response::err(err.to_string()),
        }
    }

    async fn forward_get_state(&self, server: &ServerKey, property: &str) -> Response {
        let Some(engine) = self.manager.get(server) else {
            return Response::err("no such instance");
        };
        let Some(tab) = engine.tab() else {
            return Response::err("no game tab is bound to this server");
        };
        match engine.bridge().get_state(tab, property).await {
            Ok(result) if result.success => Response::ok(result.data.unwrap_or(Value::Null)),
            Ok(result) => {
                Response::err(result.reason.or(result.error).unwrap_or_else(|| "failed".into()))
            }
            Err(err) => Response::err(err.to_string()),
        }
    }

    /// Supervisor-driven full scan: overview page, then village view.
    async fn full_scan(&self, server: &ServerKey) -> Response {
        let Some(engine) = self.manager.get(server) else {
            return Response::err("no such instance");
        };
        let Some(tab) = engine.tab() else {
            return Response::err("no game tab is bound to this server");
        };
        let bridge = engine.bridge();

        let mut pages = serde_json::Map::new();
        for page in ["dorf1", "dorf2"] {
            let nav = bridge.execute(tab, PageAction::NavigateTo, json!({"page": page})).await;
            if !nav.map(|r| r.success).unwrap_or(false) {
                return Response::err(format!("navigation to {page} failed"));
            }
            bridge.wait_for_content_script(tab, Duration::from_secs(15)).await;
            match bridge.scan(tab).await {
                Ok(state) => {
                    pages.insert(page.to_string(), serde_json::to_value(state).unwrap_or(Value::Null));
                }
                Err(err) => return Response::err(format!("scan on {page} failed: {err}")),
            }
        }
        Response::ok(Value::Object(pages))
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
