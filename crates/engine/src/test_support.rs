// SPDX-License-Identifier: MIT

//! Scripted fakes for engine tests: a transport that plays back canned
//! executor responses and a strategy that proposes a fixed list.

use crate::strategy::{Strategy, TaskProposal};
use crate::transport::{PageTransport, TabId, TransportError};
use async_trait::async_trait;
use parking_lot::Mutex;
use reeve_core::{
    BotConfig, ExecResult, ExecutorRequest, GameState, NotifyMessage, PageAction, Task,
};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};

type SendOutcome = Result<Value, TransportError>;

#[derive(Default)]
struct FakeInner {
    scans: VecDeque<SendOutcome>,
    default_scan: Option<GameState>,
    executes: HashMap<PageAction, VecDeque<SendOutcome>>,
    default_execute: Option<ExecResult>,
    get_states: HashMap<String, VecDeque<SendOutcome>>,
    sent: Vec<(TabId, ExecutorRequest)>,
    notified: Vec<(TabId, NotifyMessage)>,
    live_tabs: Vec<TabId>,
    /// Page the simulated executor believes it is on.
    current_page: String,
}

/// Scripted page transport.
///
/// Responses are drained per request shape; when a script runs dry the
/// defaults answer (a logged-in scan, a successful execute, a successful
/// probe). Every request is recorded for assertions.
#[derive(Default)]
pub struct FakeTransport {
    inner: Mutex<FakeInner>,
}

impl FakeTransport {
    pub fn new() -> Self {
        let transport = Self::default();
        {
            let mut inner = transport.inner.lock();
            inner.default_scan = Some(reeve_core::test_support::logged_in_state());
            inner.default_execute = Some(ExecResult::ok());
            inner.live_tabs = vec![17];
            inner.current_page = "dorf1".into();
        }
        transport
    }

    /// The page the simulated executor currently reports.
    pub fn current_page(&self) -> String {
        self.inner.lock().current_page.clone()
    }

    fn envelope(result: &ExecResult) -> Value {
        serde_json::to_value(result).unwrap_or(Value::Null)
    }

    /// Queue the next scan to answer with this game state.
    pub fn push_scan_state(&self, state: GameState) {
        let data = serde_json::to_value(&state).unwrap_or(Value::Null);
        self.inner
            .lock()
            .scans
            .push_back(Ok(Self::envelope(&ExecResult::ok_with(data))));
    }

    /// Queue the next scan to fail outright.
    pub fn push_scan_error(&self, error: TransportError) {
        self.inner.lock().scans.push_back(Err(error));
    }

    /// Replace the fallback scan state.
    pub fn set_default_scan(&self, state: GameState) {
        self.inner.lock().default_scan = Some(state);
    }

    /// Queue a response for the next EXECUTE of `action`.
    pub fn push_execute_result(&self, action: PageAction, result: ExecResult) {
        self.inner
            .lock()
            .executes
            .entry(action)
            .or_default()
            .push_back(Ok(Self::envelope(&result)));
    }

    pub fn push_execute_error(&self, action: PageAction, error: TransportError) {
        self.inner.lock().executes.entry(action).or_default().push_back(Err(error));
    }

    /// Queue a response for the next GET_STATE of `property`.
    pub fn push_get_state(&self, property: &str, result: ExecResult) {
        self.inner
            .lock()
            .get_states
            .entry(property.to_string())
            .or_default()
            .push_back(Ok(Self::envelope(&result)));
    }

    pub fn push_get_state_error(&self, property: &str, error: TransportError) {
        self.inner
            .lock()
            .get_states
            .entry(property.to_string())
            .or_default()
            .push_back(Err(error));
    }

    pub fn set_live_tabs(&self, tabs: Vec<TabId>) {
        self.inner.lock().live_tabs = tabs;
    }

    /// Everything sent so far.
    pub fn sent(&self) -> Vec<(TabId, ExecutorRequest)> {
        self.inner.lock().sent.clone()
    }

    /// Actions executed so far, in order.
    pub fn executed_actions(&self) -> Vec<PageAction> {
        self.inner
            .lock()
            .sent
            .iter()
            .filter_map(|(_, req)| match req {
                ExecutorRequest::Execute { action, .. } => Some(*action),
                _ => None,
            })
            .collect()
    }

    /// Request ids of EXECUTE messages, in order.
    pub fn request_ids(&self) -> Vec<u64> {
        self.inner
            .lock()
            .sent
            .iter()
            .filter_map(|(_, req)| match req {
                ExecutorRequest::Execute { request_id, .. } => Some(*request_id),
                _ => None,
            })
            .collect()
    }

    pub fn notifications(&self) -> Vec<(TabId, NotifyMessage)> {
        self.inner.lock().notified.clone()
    }

    pub fn scan_count(&self) -> usize {
        self.inner
            .lock()
            .sent
            .iter()
            .filter(|(_, req)| matches!(req, ExecutorRequest::Scan))
            .count()
    }
}

#[async_trait]
impl PageTransport for FakeTransport {
    async fn send(&self, tab: TabId, request: ExecutorRequest) -> Result<Value, TransportError> {
        let mut inner = self.inner.lock();
        inner.sent.push((tab, request.clone()));
        match request {
            ExecutorRequest::Scan => {
                if let Some(scripted) = inner.scans.pop_front() {
                    return scripted;
                }
                let state = inner.default_scan.clone().unwrap_or_default();
                let data = serde_json::to_value(&state).unwrap_or(Value::Null);
                Ok(Self::envelope(&ExecResult::ok_with(data)))
            }
            ExecutorRequest::Execute { action, params, .. } => {
                let outcome = match inner.executes.get_mut(&action).and_then(|q| q.pop_front()) {
                    Some(scripted) => scripted,
                    None => {
                        let result = inner.default_execute.clone().unwrap_or_else(ExecResult::ok);
                        Ok(Self::envelope(&result))
                    }
                };
                // Track navigation so page probes answer realistically
                let succeeded = outcome
                    .as_ref()
                    .ok()
                    .and_then(|v| v.get("success"))
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                if succeeded {
                    match action {
                        PageAction::NavigateTo => {
                            if let Some(page) = params.get("page").and_then(Value::as_str) {
                                inner.current_page = page.to_string();
                            }
                        }
                        PageAction::SwitchVillage => inner.current_page = "dorf1".into(),
                        _ => {}
                    }
                }
                outcome
            }
            ExecutorRequest::GetState { params } => {
                if let Some(scripted) =
                    inner.get_states.get_mut(&params.property).and_then(|q| q.pop_front())
                {
                    return scripted;
                }
                let data = match params.property.as_str() {
                    "page" => Value::String(inner.current_page.clone()),
                    "captcha" => Value::Bool(false),
                    "villages" => {
                        let villages =
                            inner.default_scan.as_ref().map(|s| s.villages.clone()).unwrap_or_default();
                        serde_json::to_value(villages).unwrap_or(Value::Null)
                    }
                    _ => Value::Null,
                };
                Ok(Self::envelope(&ExecResult::ok_with(data)))
            }
        }
    }

    async fn notify(&self, tab: TabId, message: NotifyMessage) -> Result<(), TransportError> {
        self.inner.lock().notified.push((tab, message));
        Ok(())
    }

    async fn tab_exists(&self, tab: TabId) -> bool {
        self.inner.lock().live_tabs.contains(&tab)
    }
}

/// Strategy that proposes a scripted list once, then nothing.
#[derive(Default)]
pub struct FakeStrategy {
    proposals: Mutex<VecDeque<Vec<TaskProposal>>>,
    repeat: Mutex<Option<Vec<TaskProposal>>>,
    observed: Mutex<Vec<GameState>>,
}

impl FakeStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Propose this list on the next cycle only.
    pub fn push_proposals(&self, proposals: Vec<TaskProposal>) {
        self.proposals.lock().push_back(proposals);
    }

    /// Propose this list on every cycle without a scripted one.
    pub fn repeat_proposals(&self, proposals: Vec<TaskProposal>) {
        *self.repeat.lock() = Some(proposals);
    }

    /// Game states the strategy was shown, for injection assertions.
    pub fn observed_states(&self) -> Vec<GameState> {
        self.observed.lock().clone()
    }
}

impl Strategy for FakeStrategy {
    fn decide(&self, state: &GameState, _config: &BotConfig, _queue: &[Task]) -> Vec<TaskProposal> {
        self.observed.lock().push(state.clone());
        if let Some(scripted) = self.proposals.lock().pop_front() {
            return scripted;
        }
        self.repeat.lock().clone().unwrap_or_default()
    }

    fn describe(&self) -> Value {
        serde_json::json!({"name": "fake"})
    }
}
