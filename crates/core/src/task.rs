// SPDX-License-Identifier: MIT

//! Task record and status state machine for the per-server queue.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Default retry cap before a task goes terminal.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Monotonic task identifier, unique within one queue.
pub type TaskId = u64;

/// The closed set of task kinds the engine knows how to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    UpgradeResource,
    UpgradeBuilding,
    BuildNew,
    TrainTroops,
    TrainTraps,
    SendFarm,
    SendAttack,
    HeroAdventure,
    Navigate,
    SwitchVillage,
    /// Meta-task: a strategy demanding an immediate emergency stop.
    EmergencyStop,
}

crate::simple_display! {
    TaskKind {
        UpgradeResource => "upgrade_resource",
        UpgradeBuilding => "upgrade_building",
        BuildNew => "build_new",
        TrainTroops => "train_troops",
        TrainTraps => "train_traps",
        SendFarm => "send_farm",
        SendAttack => "send_attack",
        HeroAdventure => "hero_adventure",
        Navigate => "navigate",
        SwitchVillage => "switch_village",
        EmergencyStop => "emergency_stop",
    }
}

impl TaskKind {
    /// Kinds that target a concrete build slot and dedup on it.
    pub fn is_build_like(self) -> bool {
        matches!(self, TaskKind::UpgradeResource | TaskKind::UpgradeBuilding | TaskKind::BuildNew)
    }

    /// Kinds whose execution already ends on the resource overview page,
    /// so the post-task return-home navigation is skipped.
    pub fn ends_at_overview(self) -> bool {
        matches!(self, TaskKind::UpgradeResource | TaskKind::Navigate | TaskKind::SwitchVillage)
    }
}

/// Status of a queued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

crate::simple_display! {
    TaskStatus {
        Pending => "pending",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
    }
}

/// Loosely-structured task parameters from strategies or the operator UI.
///
/// Known fields are typed and optional; anything else rides along in
/// `extra` and is passed through to the page executor untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gid: Option<u32>,
    /// Training building for troop tasks (e.g. "barracks", "stable").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building_type: Option<String>,
    /// Target page for navigate tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
    /// Farm list identifier for send_farm tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_id: Option<String>,
    /// Troop counts keyed by unit name.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub troops: HashMap<String, u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u32>,
    /// Known upgrade cost, used by the reactive hero-resource fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<crate::game::Resources>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl TaskParams {
    /// Best-effort parse from an untyped value. Non-objects are dropped
    /// with a warning at the boundary rather than rejected.
    pub fn from_value(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }

    /// The dedup target for build-like kinds: field, slot, or gid.
    pub fn build_target(&self) -> Option<u32> {
        self.field_id.or(self.slot).or(self.gid)
    }
}

/// One entry in the task queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    #[serde(default)]
    pub params: TaskParams,
    /// 1 = highest, 10 = lowest.
    pub priority: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub village_id: Option<String>,
    pub status: TaskStatus,
    pub created_at_ms: u64,
    /// Earliest time the task may be picked up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_for_ms: Option<u64>,
    #[serde(default)]
    pub retries: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    /// When the task reached a terminal status (drives eviction).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

/// The cooldown key for a (kind, params) pair: `kind:slot` for build-like
/// kinds with a target, else `kind`.
pub fn cooldown_key_for(kind: TaskKind, params: &TaskParams) -> String {
    match params.build_target() {
        Some(target) if kind.is_build_like() => format!("{kind}:{target}"),
        _ => kind.to_string(),
    }
}

impl Task {
    /// Ready to be picked up by `get_next` at `now_ms`.
    pub fn is_ready(&self, now_ms: u64) -> bool {
        self.status == TaskStatus::Pending
            && self.scheduled_for_ms.map(|t| t <= now_ms).unwrap_or(true)
    }

    /// The cooldown key: `kind:slot` for build-like kinds, else `kind`.
    pub fn cooldown_key(&self) -> String {
        cooldown_key_for(self.kind, &self.params)
    }

    /// Whether another add with (kind, village, params) would duplicate this task.
    ///
    /// Only non-terminal tasks participate. Build-like kinds match on the
    /// build target, troop training on the building type, and send_farm on
    /// the village alone.
    pub fn duplicates(&self, kind: TaskKind, village_id: Option<&str>, params: &TaskParams) -> bool {
        if self.status.is_terminal() || self.kind != kind {
            return false;
        }
        let same_village = self.village_id.as_deref() == village_id;
        match kind {
            k if k.is_build_like() => {
                same_village && self.params.build_target() == params.build_target()
            }
            TaskKind::TrainTroops => {
                same_village && self.params.building_type == params.building_type
            }
            TaskKind::SendFarm => same_village,
            _ => false,
        }
    }
}

crate::builder! {
    pub struct TaskBuilder => Task {
        into {
            kind: TaskKind = TaskKind::UpgradeResource,
        }
        set {
            id: TaskId = 1,
            params: TaskParams = TaskParams::default(),
            priority: u8 = 5,
            status: TaskStatus = TaskStatus::Pending,
            created_at_ms: u64 = 0,
            retries: u32 = 0,
            max_retries: u32 = DEFAULT_MAX_RETRIES,
        }
        option {
            village_id: String = None,
            scheduled_for_ms: u64 = None,
            error: String = None,
            started_at_ms: u64 = None,
            finished_at_ms: u64 = None,
        }
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
