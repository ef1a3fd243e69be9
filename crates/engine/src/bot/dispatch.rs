// SPDX-License-Identifier: MIT

//! Per-kind action sequences.
//!
//! Every task kind maps to a fixed sequence of page actions. Navigation
//! steps are verified against the executor's reported page; a step that
//! lands somewhere unexpected yields `page_mismatch` rather than blindly
//! clicking into the wrong screen.

use super::execute::EXECUTOR_WAIT;
use super::BotEngine;
use crate::bridge::BridgeError;
use crate::strategy::Strategy;
use crate::transport::{PageTransport, TabId};
use rand::Rng;
use reeve_core::{Clock, ExecResult, PageAction, Task, TaskKind};
use serde_json::{json, Value};
use std::time::Duration;

impl<T, S, C> BotEngine<T, S, C>
where
    T: PageTransport,
    S: Strategy,
    C: Clock,
{
    pub(super) async fn dispatch_task(
        &self,
        tab: TabId,
        task: &Task,
    ) -> Result<ExecResult, BridgeError> {
        match task.kind {
            TaskKind::UpgradeResource => self.seq_upgrade_resource(tab, task).await,
            TaskKind::UpgradeBuilding => self.seq_upgrade_building(tab, task).await,
            TaskKind::BuildNew => self.seq_build_new(tab, task).await,
            TaskKind::TrainTroops => self.seq_train_troops(tab, task).await,
            TaskKind::TrainTraps => {
                self.bridge.execute(tab, PageAction::TrainTraps, params_value(task)).await
            }
            TaskKind::SendFarm => self.seq_send_farm(tab, task).await,
            TaskKind::SendAttack => {
                self.bridge.execute(tab, PageAction::SendAttack, params_value(task)).await
            }
            TaskKind::HeroAdventure => {
                self.bridge.execute(tab, PageAction::SendHeroAdventure, Value::Null).await
            }
            TaskKind::Navigate => self.seq_navigate(tab, task).await,
            TaskKind::SwitchVillage => self.seq_switch_village(tab, task).await,
            // Meta-task; honoured in the decide phase, never dispatched
            TaskKind::EmergencyStop => Ok(ExecResult::failed("page_mismatch")),
        }
    }

    async fn seq_upgrade_resource(
        &self,
        tab: TabId,
        task: &Task,
    ) -> Result<ExecResult, BridgeError> {
        let Some(field_id) = task.params.field_id else {
            return Ok(ExecResult::failed("input_not_found"));
        };
        if let Some(fail) = self.goto_page(tab, "dorf1").await? {
            return Ok(fail);
        }
        let clicked = self
            .bridge
            .execute(tab, PageAction::ClickResourceField, json!({"fieldId": field_id}))
            .await?;
        if !clicked.success {
            return Ok(clicked);
        }
        self.bridge.wait_for_content_script(tab, EXECUTOR_WAIT).await;
        self.human_delay().await;
        let upgraded = self.bridge.execute(tab, PageAction::ClickUpgradeButton, Value::Null).await?;
        if upgraded.success {
            self.bridge.wait_for_content_script(tab, EXECUTOR_WAIT).await;
        }
        Ok(upgraded)
    }

    async fn seq_upgrade_building(
        &self,
        tab: TabId,
        task: &Task,
    ) -> Result<ExecResult, BridgeError> {
        let Some(slot) = task.params.slot else {
            return Ok(ExecResult::failed("input_not_found"));
        };
        if let Some(fail) = self.goto_page(tab, "dorf2").await? {
            return Ok(fail);
        }
        let clicked = self
            .bridge
            .execute(tab, PageAction::ClickBuildingSlot, json!({"slot": slot}))
            .await?;
        if !clicked.success {
            return Ok(clicked);
        }
        self.bridge.wait_for_content_script(tab, EXECUTOR_WAIT).await;
        self.human_delay().await;
        let upgraded = self.bridge.execute(tab, PageAction::ClickUpgradeButton, Value::Null).await?;
        if upgraded.success {
            self.bridge.wait_for_content_script(tab, EXECUTOR_WAIT).await;
        }
        Ok(upgraded)
    }

    async fn seq_build_new(&self, tab: TabId, task: &Task) -> Result<ExecResult, BridgeError> {
        let (Some(slot), Some(gid)) = (task.params.slot, task.params.gid) else {
            return Ok(ExecResult::failed("input_not_found"));
        };
        if let Some(fail) = self.goto_page(tab, "dorf2").await? {
            return Ok(fail);
        }
        let clicked = self
            .bridge
            .execute(tab, PageAction::ClickBuildingSlot, json!({"slot": slot}))
            .await?;
        if !clicked.success {
            return Ok(clicked);
        }
        self.bridge.wait_for_content_script(tab, EXECUTOR_WAIT).await;
        self.human_delay().await;
        let tabbed = self.bridge.execute(tab, PageAction::ClickBuildTab, Value::Null).await?;
        if !tabbed.success {
            return Ok(tabbed);
        }
        self.human_delay().await;
        let built = self.bridge.execute(tab, PageAction::BuildNewByGid, json!({"gid": gid})).await?;
        if built.success {
            self.bridge.wait_for_content_script(tab, EXECUTOR_WAIT).await;
        }
        Ok(built)
    }

    async fn seq_train_troops(&self, tab: TabId, task: &Task) -> Result<ExecResult, BridgeError> {
        let Some(building) = task.params.building_type.clone() else {
            return Ok(ExecResult::failed("input_not_found"));
        };
        let batch = self.with_state(|s| s.config.troop.batch_size);
        let mut params = params_value(task);
        if let Some(map) = params.as_object_mut() {
            map.entry("buildingType").or_insert(json!(building));
            if task.params.troops.is_empty() {
                map.insert("batchSize".into(), json!(batch));
            }
        }
        self.bridge.execute(tab, PageAction::TrainTroops, params).await
    }

    async fn seq_send_farm(&self, tab: TabId, task: &Task) -> Result<ExecResult, BridgeError> {
        if let Some(list_id) = task.params.list_id.clone() {
            let opened = self.bridge.execute(tab, PageAction::ClickFarmListTab, Value::Null).await?;
            if !opened.success {
                return Ok(opened);
            }
            self.human_delay().await;
            return self
                .bridge
                .execute(tab, PageAction::SendFarmList, json!({"listId": list_id}))
                .await;
        }
        let selective = self.with_state(|s| s.config.farm.selective);
        if selective {
            self.bridge.execute(tab, PageAction::SelectiveFarmSend, params_value(task)).await
        } else {
            self.bridge.execute(tab, PageAction::SendAllFarmLists, Value::Null).await
        }
    }

    async fn seq_navigate(&self, tab: TabId, task: &Task) -> Result<ExecResult, BridgeError> {
        let Some(page) = task.params.page.clone() else {
            return Ok(ExecResult::failed("input_not_found"));
        };
        let result = self.bridge.execute(tab, PageAction::NavigateTo, json!({"page": page})).await?;
        if result.success {
            self.bridge.wait_for_content_script(tab, EXECUTOR_WAIT).await;
        }
        Ok(result)
    }

    async fn seq_switch_village(&self, tab: TabId, task: &Task) -> Result<ExecResult, BridgeError> {
        let Some(village) = task.village_id.clone() else {
            return Ok(ExecResult::failed("input_not_found"));
        };
        let result = self
            .bridge
            .execute(tab, PageAction::SwitchVillage, json!({"villageId": village}))
            .await?;
        if result.success {
            self.bridge.wait_for_content_script(tab, EXECUTOR_WAIT).await;
        }
        Ok(result)
    }

    /// Navigate to `page` and verify the executor landed there.
    ///
    /// `Ok(Some(failure))` means the sequence should end with that result.
    pub(super) async fn goto_page(
        &self,
        tab: TabId,
        page: &str,
    ) -> Result<Option<ExecResult>, BridgeError> {
        let nav = self.bridge.execute(tab, PageAction::NavigateTo, json!({"page": page})).await?;
        if !nav.success {
            return Ok(Some(nav));
        }
        self.bridge.wait_for_content_script(tab, EXECUTOR_WAIT).await;
        self.human_delay().await;

        let probe = self.bridge.get_state(tab, "page").await?;
        let on_page = probe.success
            && probe.data.as_ref().and_then(Value::as_str).map(|p| p == page).unwrap_or(false);
        if !on_page {
            return Ok(Some(ExecResult::failed("page_mismatch")));
        }
        Ok(None)
    }

    /// Sleep a human-looking interval between in-page actions.
    pub(crate) async fn human_delay(&self) {
        let (min, max) = self.with_state(|s| (s.config.delays.action_min_ms, s.config.delays.action_max_ms));
        if max == 0 {
            return;
        }
        let ms = if max > min { rand::thread_rng().gen_range(min..=max) } else { min };
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

/// Task params as a JSON object for pass-through actions.
fn params_value(task: &Task) -> Value {
    serde_json::to_value(&task.params).unwrap_or(Value::Null)
}
