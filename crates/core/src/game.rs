// SPDX-License-Identifier: MIT

//! Loosely-structured game state as reported by the page executor.
//!
//! Everything here crosses a trust boundary: the page can omit or garble
//! any field, so every field is optional or defaulted and validation is
//! log-and-drop, never a hard error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The four resource types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Wood,
    Clay,
    Iron,
    Crop,
}

crate::simple_display! {
    ResourceKind {
        Wood => "wood",
        Clay => "clay",
        Iron => "iron",
        Crop => "crop",
    }
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] =
        [ResourceKind::Wood, ResourceKind::Clay, ResourceKind::Iron, ResourceKind::Crop];
}

/// Current stockpile (or a cost, or a transfer amount).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default)]
    pub wood: u64,
    #[serde(default)]
    pub clay: u64,
    #[serde(default)]
    pub iron: u64,
    #[serde(default)]
    pub crop: u64,
}

impl Resources {
    pub fn get(&self, kind: ResourceKind) -> u64 {
        match kind {
            ResourceKind::Wood => self.wood,
            ResourceKind::Clay => self.clay,
            ResourceKind::Iron => self.iron,
            ResourceKind::Crop => self.crop,
        }
    }

    pub fn set(&mut self, kind: ResourceKind, amount: u64) {
        match kind {
            ResourceKind::Wood => self.wood = amount,
            ResourceKind::Clay => self.clay = amount,
            ResourceKind::Iron => self.iron = amount,
            ResourceKind::Crop => self.crop = amount,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.wood == 0 && self.clay == 0 && self.iron == 0 && self.crop == 0
    }
}

/// Storage limits: warehouse covers wood/clay/iron, granary covers crop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Capacity {
    #[serde(default)]
    pub warehouse: u64,
    #[serde(default)]
    pub granary: u64,
}

impl Capacity {
    pub fn for_kind(&self, kind: ResourceKind) -> u64 {
        match kind {
            ResourceKind::Crop => self.granary,
            _ => self.warehouse,
        }
    }
}

/// Hero status as scanned from the page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeroState {
    #[serde(default)]
    pub at_home: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_pct: Option<u32>,
    /// Inventory UI version: 2 supports bulk transfer, 1 needs a per-type loop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adventures: Option<u32>,
}

/// One village in the account overview.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VillageInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub active: bool,
}

/// One building slot from the village view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildingSlot {
    pub slot: u32,
    #[serde(default)]
    pub gid: u32,
    #[serde(default)]
    pub level: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub under_construction: bool,
}

/// One entry in the construction queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstructionEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<u32>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub level: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_at_ms: Option<u64>,
}

/// Snapshot of game state from one SCAN.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    /// None means the scan did not report login state; only an explicit
    /// `false` counts toward the session-expiry streak.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logged_in: Option<bool>,
    #[serde(default)]
    pub captcha: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Resources>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<Capacity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hero: Option<HeroState>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub villages: Vec<VillageInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_village: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buildings: Vec<BuildingSlot>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub construction_queue: Vec<ConstructionEntry>,
    /// Which page the executor believes it is on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
    /// Injected by the engine before the decide phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_farm_at_ms: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl GameState {
    /// Lenient parse from the executor's scan payload.
    pub fn from_value(value: Value) -> Option<Self> {
        match serde_json::from_value(value) {
            Ok(state) => Some(state),
            Err(_) => None,
        }
    }

    /// Fill percentage of one resource against its storage, 0..=100.
    ///
    /// Returns `None` when the scan carried no resource or capacity data,
    /// or the capacity is zero.
    pub fn fill_pct(&self, kind: ResourceKind) -> Option<u32> {
        let amount = self.resources.as_ref()?.get(kind);
        let cap = self.capacity.as_ref()?.for_kind(kind);
        if cap == 0 {
            return None;
        }
        Some(((amount * 100) / cap).min(100) as u32)
    }

    /// The lowest resource fill percentage, if computable.
    pub fn lowest_fill_pct(&self) -> Option<(ResourceKind, u32)> {
        ResourceKind::ALL
            .iter()
            .filter_map(|&k| self.fill_pct(k).map(|p| (k, p)))
            .min_by_key(|&(_, p)| p)
    }
}

#[cfg(test)]
#[path = "game_tests.rs"]
mod tests;
