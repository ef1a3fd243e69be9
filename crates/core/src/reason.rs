// SPDX-License-Identifier: MIT

//! Failure reason codes reported by the page executor, and the cooldown
//! tables keyed on them.
//!
//! A "hopeless" reason makes retries pointless in the short term: the
//! engine forces the task to its retry cap and applies the reason-specific
//! fail cooldown instead of burning retries on it.

use crate::task::TaskKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Failure reasons the engine dispatches on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailReason {
    NoAdventure,
    HeroUnavailable,
    InsufficientResources,
    QueueFull,
    BuildingNotAvailable,
    NoItems,
    PageMismatch,
    SlotOccupied,
    PrerequisitesNotMet,
    InputNotFound,
    InputDisabled,
    ButtonNotFound,
    #[serde(untagged)]
    Other(String),
}

crate::simple_display! {
    FailReason {
        NoAdventure => "no_adventure",
        HeroUnavailable => "hero_unavailable",
        InsufficientResources => "insufficient_resources",
        QueueFull => "queue_full",
        BuildingNotAvailable => "building_not_available",
        NoItems => "no_items",
        PageMismatch => "page_mismatch",
        SlotOccupied => "slot_occupied",
        PrerequisitesNotMet => "prerequisites_not_met",
        InputNotFound => "input_not_found",
        InputDisabled => "input_disabled",
        ButtonNotFound => "button_not_found",
        Other(..) => "other",
    }
}

impl FailReason {
    pub fn from_wire(reason: &str) -> Self {
        match reason {
            "no_adventure" => FailReason::NoAdventure,
            "hero_unavailable" => FailReason::HeroUnavailable,
            "insufficient_resources" => FailReason::InsufficientResources,
            "queue_full" => FailReason::QueueFull,
            "building_not_available" => FailReason::BuildingNotAvailable,
            "no_items" => FailReason::NoItems,
            "page_mismatch" => FailReason::PageMismatch,
            "slot_occupied" => FailReason::SlotOccupied,
            "prerequisites_not_met" => FailReason::PrerequisitesNotMet,
            "input_not_found" => FailReason::InputNotFound,
            "input_disabled" => FailReason::InputDisabled,
            "button_not_found" => FailReason::ButtonNotFound,
            other => FailReason::Other(other.to_string()),
        }
    }

    /// The wire spelling, preserving unknown reasons verbatim.
    pub fn wire_name(&self) -> &str {
        match self {
            FailReason::NoAdventure => "no_adventure",
            FailReason::HeroUnavailable => "hero_unavailable",
            FailReason::InsufficientResources => "insufficient_resources",
            FailReason::QueueFull => "queue_full",
            FailReason::BuildingNotAvailable => "building_not_available",
            FailReason::NoItems => "no_items",
            FailReason::PageMismatch => "page_mismatch",
            FailReason::SlotOccupied => "slot_occupied",
            FailReason::PrerequisitesNotMet => "prerequisites_not_met",
            FailReason::InputNotFound => "input_not_found",
            FailReason::InputDisabled => "input_disabled",
            FailReason::ButtonNotFound => "button_not_found",
            FailReason::Other(s) => s,
        }
    }

    /// Retrying soon cannot help; force the task to its retry cap.
    pub fn is_hopeless(&self) -> bool {
        !matches!(self, FailReason::ButtonNotFound | FailReason::Other(_))
    }

    /// Resource-wide conditions cool down the whole task type, not one slot.
    pub fn is_type_level(&self) -> bool {
        matches!(self, FailReason::QueueFull | FailReason::InsufficientResources)
    }
}

/// Cooldown applied to a task's dedup key after a successful execution.
pub fn success_cooldown(kind: TaskKind) -> Duration {
    let secs = match kind {
        TaskKind::UpgradeResource | TaskKind::UpgradeBuilding | TaskKind::BuildNew => 60,
        TaskKind::TrainTroops => 120,
        TaskKind::TrainTraps => 120,
        TaskKind::SendFarm | TaskKind::SendAttack => 300,
        TaskKind::HeroAdventure => 180,
        _ => 30,
    };
    Duration::from_secs(secs)
}

/// Cooldown applied after a failure with the given reason.
pub fn fail_cooldown(reason: &FailReason) -> Duration {
    let secs = match reason {
        FailReason::NoAdventure => 600,
        FailReason::HeroUnavailable => 300,
        FailReason::InsufficientResources => 180,
        FailReason::QueueFull => 120,
        FailReason::BuildingNotAvailable => 300,
        FailReason::PageMismatch => 30,
        FailReason::ButtonNotFound => 300,
        FailReason::SlotOccupied => 600,
        FailReason::PrerequisitesNotMet => 300,
        FailReason::InputNotFound | FailReason::InputDisabled => 300,
        _ => 60,
    };
    Duration::from_secs(secs)
}

#[cfg(test)]
#[path = "reason_tests.rs"]
mod tests;
