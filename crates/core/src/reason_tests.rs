// SPDX-License-Identifier: MIT

use super::*;
use std::time::Duration;

#[yare::parameterized(
    no_adventure  = { "no_adventure", FailReason::NoAdventure },
    hero          = { "hero_unavailable", FailReason::HeroUnavailable },
    resources     = { "insufficient_resources", FailReason::InsufficientResources },
    queue_full    = { "queue_full", FailReason::QueueFull },
    mismatch      = { "page_mismatch", FailReason::PageMismatch },
    unknown       = { "weird_new_reason", FailReason::Other("weird_new_reason".into()) },
)]
fn from_wire_roundtrip(wire: &str, expected: FailReason) {
    assert_eq!(FailReason::from_wire(wire), expected);
}

#[test]
fn hopeless_set_matches_policy() {
    for reason in [
        FailReason::NoAdventure,
        FailReason::HeroUnavailable,
        FailReason::InsufficientResources,
        FailReason::QueueFull,
        FailReason::BuildingNotAvailable,
        FailReason::NoItems,
        FailReason::PageMismatch,
        FailReason::SlotOccupied,
        FailReason::PrerequisitesNotMet,
        FailReason::InputNotFound,
        FailReason::InputDisabled,
    ] {
        assert!(reason.is_hopeless(), "{reason:?}");
    }
    assert!(!FailReason::ButtonNotFound.is_hopeless());
    assert!(!FailReason::Other("timeout".into()).is_hopeless());
}

#[test]
fn type_level_reasons() {
    assert!(FailReason::QueueFull.is_type_level());
    assert!(FailReason::InsufficientResources.is_type_level());
    assert!(!FailReason::SlotOccupied.is_type_level());
}

#[yare::parameterized(
    resource  = { TaskKind::UpgradeResource, 60 },
    building  = { TaskKind::UpgradeBuilding, 60 },
    build_new = { TaskKind::BuildNew, 60 },
    troops    = { TaskKind::TrainTroops, 120 },
    traps     = { TaskKind::TrainTraps, 120 },
    farm      = { TaskKind::SendFarm, 300 },
    attack    = { TaskKind::SendAttack, 300 },
    adventure = { TaskKind::HeroAdventure, 180 },
    navigate  = { TaskKind::Navigate, 30 },
)]
fn success_cooldown_table(kind: TaskKind, secs: u64) {
    assert_eq!(success_cooldown(kind), Duration::from_secs(secs));
}

#[yare::parameterized(
    no_adventure = { FailReason::NoAdventure, 600 },
    hero         = { FailReason::HeroUnavailable, 300 },
    resources    = { FailReason::InsufficientResources, 180 },
    queue_full   = { FailReason::QueueFull, 120 },
    building     = { FailReason::BuildingNotAvailable, 300 },
    mismatch     = { FailReason::PageMismatch, 30 },
    button       = { FailReason::ButtonNotFound, 300 },
    slot         = { FailReason::SlotOccupied, 600 },
    prereq       = { FailReason::PrerequisitesNotMet, 300 },
    input        = { FailReason::InputNotFound, 300 },
    disabled     = { FailReason::InputDisabled, 300 },
    no_items     = { FailReason::NoItems, 60 },
    other        = { FailReason::Other("x".into()), 60 },
)]
fn fail_cooldown_table(reason: FailReason, secs: u64) {
    assert_eq!(fail_cooldown(&reason), Duration::from_secs(secs));
}

#[test]
fn wire_serde() {
    assert_eq!(serde_json::to_string(&FailReason::QueueFull).unwrap(), "\"queue_full\"");
    let parsed: FailReason = serde_json::from_str("\"something_else\"").unwrap();
    assert_eq!(parsed, FailReason::Other("something_else".into()));
}
