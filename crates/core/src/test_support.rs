// SPDX-License-Identifier: MIT

//! Test builders, fixtures, and proptest strategies shared across crates.

use crate::game::{Capacity, GameState, HeroState, Resources, VillageInfo};
use crate::task::{TaskKind, TaskParams, TaskStatus};

/// A scan result for a logged-in account with one active village.
pub fn logged_in_state() -> GameState {
    GameState {
        logged_in: Some(true),
        resources: Some(Resources { wood: 500, clay: 500, iron: 500, crop: 400 }),
        capacity: Some(Capacity { warehouse: 800, granary: 800 }),
        hero: Some(HeroState { at_home: true, ..Default::default() }),
        villages: vec![VillageInfo { id: "v1".into(), name: "Main".into(), active: true }],
        active_village: Some("v1".into()),
        version: Some("4.6".into()),
        page: Some("dorf1".into()),
        ..Default::default()
    }
}

/// Params targeting one resource field.
pub fn field_params(field_id: u32) -> TaskParams {
    TaskParams { field_id: Some(field_id), ..Default::default() }
}

/// Params targeting one building slot.
pub fn slot_params(slot: u32) -> TaskParams {
    TaskParams { slot: Some(slot), ..Default::default() }
}

pub mod strategies {
    use super::*;
    use proptest::prelude::*;

    pub fn arb_task_kind() -> impl Strategy<Value = TaskKind> {
        prop_oneof![
            Just(TaskKind::UpgradeResource),
            Just(TaskKind::UpgradeBuilding),
            Just(TaskKind::BuildNew),
            Just(TaskKind::TrainTroops),
            Just(TaskKind::TrainTraps),
            Just(TaskKind::SendFarm),
            Just(TaskKind::SendAttack),
            Just(TaskKind::HeroAdventure),
            Just(TaskKind::Navigate),
            Just(TaskKind::SwitchVillage),
        ]
    }

    pub fn arb_task_status() -> impl Strategy<Value = TaskStatus> {
        prop_oneof![
            Just(TaskStatus::Pending),
            Just(TaskStatus::Running),
            Just(TaskStatus::Completed),
            Just(TaskStatus::Failed),
        ]
    }

    pub fn arb_priority() -> impl Strategy<Value = u8> {
        1u8..=10
    }
}
