// SPDX-License-Identifier: MIT

//! The decision-module seam.
//!
//! Strategies look at the freshly scanned game state, the config, and the
//! current queue, and propose tasks. The engine owns everything after
//! that: cooldown filtering, dedup, ordering, execution.

use reeve_core::{BotConfig, GameState, Task, TaskKind, TaskParams};
use serde_json::Value;

/// One proposed task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskProposal {
    pub kind: TaskKind,
    pub params: TaskParams,
    /// 1 = highest, 10 = lowest.
    pub priority: u8,
    pub village_id: Option<String>,
    pub scheduled_for_ms: Option<u64>,
}

impl TaskProposal {
    pub fn new(kind: TaskKind, params: TaskParams, priority: u8) -> Self {
        Self { kind, params, priority, village_id: None, scheduled_for_ms: None }
    }

    pub fn for_village(mut self, village_id: impl Into<String>) -> Self {
        self.village_id = Some(village_id.into());
        self
    }
}

/// A pluggable decision module.
pub trait Strategy: Send + Sync + 'static {
    /// Propose tasks for this cycle. Called once per cycle with the scan
    /// result (including the injected `last_farm_at_ms`).
    fn decide(&self, state: &GameState, config: &BotConfig, queue: &[Task]) -> Vec<TaskProposal>;

    /// Human-readable description for the operator UI.
    fn describe(&self) -> Value {
        Value::String("unnamed strategy".into())
    }
}

impl<S: Strategy> Strategy for std::sync::Arc<S> {
    fn decide(&self, state: &GameState, config: &BotConfig, queue: &[Task]) -> Vec<TaskProposal> {
        (**self).decide(state, config, queue)
    }

    fn describe(&self) -> Value {
        (**self).describe()
    }
}

/// Strategy that proposes nothing. The daemon default until the operator
/// wires a real decision module.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStrategy;

impl Strategy for NoopStrategy {
    fn decide(&self, _state: &GameState, _config: &BotConfig, _queue: &[Task]) -> Vec<TaskProposal> {
        Vec::new()
    }

    fn describe(&self) -> Value {
        serde_json::json!({"name": "noop", "proposes": []})
    }
}
