// SPDX-License-Identifier: MIT

//! Wire types for the page-executor message channel.
//!
//! The executor inside the game page consumes a closed set of named
//! actions; the engine never sends a free-form string.

use crate::reason::FailReason;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Actions the page executor knows how to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PageAction {
    NavigateTo,
    ClickResourceField,
    ClickBuildingSlot,
    ClickUpgradeButton,
    ClickFarmListTab,
    ClickBuildTab,
    BuildNewByGid,
    TrainTroops,
    TrainTraps,
    SendFarmList,
    SendAllFarmLists,
    SelectiveFarmSend,
    SendAttack,
    SendHeroAdventure,
    UseHeroItem,
    UseHeroItemBulk,
    ScanHeroInventory,
    SwitchVillage,
    ScanFarmListSlots,
    AddToFarmList,
}

crate::simple_display! {
    PageAction {
        NavigateTo => "navigateTo",
        ClickResourceField => "clickResourceField",
        ClickBuildingSlot => "clickBuildingSlot",
        ClickUpgradeButton => "clickUpgradeButton",
        ClickFarmListTab => "clickFarmListTab",
        ClickBuildTab => "clickBuildTab",
        BuildNewByGid => "buildNewByGid",
        TrainTroops => "trainTroops",
        TrainTraps => "trainTraps",
        SendFarmList => "sendFarmList",
        SendAllFarmLists => "sendAllFarmLists",
        SelectiveFarmSend => "selectiveFarmSend",
        SendAttack => "sendAttack",
        SendHeroAdventure => "sendHeroAdventure",
        UseHeroItem => "useHeroItem",
        UseHeroItemBulk => "useHeroItemBulk",
        ScanHeroInventory => "scanHeroInventory",
        SwitchVillage => "switchVillage",
        ScanFarmListSlots => "scanFarmListSlots",
        AddToFarmList => "addToFarmList",
    }
}

impl PageAction {
    /// Actions that reload the page, requiring an executor liveness wait after.
    pub fn reloads_page(self) -> bool {
        matches!(
            self,
            PageAction::NavigateTo
                | PageAction::ClickResourceField
                | PageAction::ClickBuildingSlot
                | PageAction::ClickUpgradeButton
                | PageAction::BuildNewByGid
                | PageAction::SwitchVillage
        )
    }
}

/// Request sent to the page executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutorRequest {
    /// Full game-state snapshot.
    #[serde(rename = "SCAN")]
    Scan,

    /// Invoke a named action.
    #[serde(rename = "EXECUTE")]
    Execute {
        action: PageAction,
        #[serde(default, skip_serializing_if = "Value::is_null")]
        params: Value,
        /// Monotonic id so the executor can discard replays of an
        /// already-applied request.
        #[serde(rename = "_requestId")]
        request_id: u64,
    },

    /// Cheap single-property probe (liveness, village list).
    #[serde(rename = "GET_STATE")]
    GetState { params: GetStateParams },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetStateParams {
    pub property: String,
}

/// Fire-and-forget operator notice shown by the page.
///
/// Uses an `action` discriminator on the wire, unlike the request enum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyMessage {
    /// Always `"NOTIFY"`.
    pub action: String,
    pub data: NotifyData,
}

impl NotifyMessage {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            action: "NOTIFY".to_string(),
            data: NotifyData { kind: kind.into(), message: message.into() },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyData {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

/// Result of an executor request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ExecResult {
    pub fn ok() -> Self {
        Self { success: true, ..Default::default() }
    }

    pub fn ok_with(data: Value) -> Self {
        Self { success: true, data: Some(data), ..Default::default() }
    }

    pub fn failed(reason: &str) -> Self {
        Self { success: false, reason: Some(reason.to_string()), ..Default::default() }
    }

    /// Parse the failure reason, if one was reported.
    pub fn fail_reason(&self) -> Option<FailReason> {
        if self.success {
            return None;
        }
        self.reason.as_deref().map(FailReason::from_wire)
    }
}

#[cfg(test)]
#[path = "action_tests.rs"]
mod tests;
