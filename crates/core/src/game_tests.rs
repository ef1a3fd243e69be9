// SPDX-License-Identifier: MIT

use super::*;
use serde_json::json;

#[test]
fn lenient_parse_tolerates_sparse_scan() {
    let state = GameState::from_value(json!({"loggedIn": true})).unwrap();
    assert_eq!(state.logged_in, Some(true));
    assert!(!state.captcha);
    assert!(state.resources.is_none());
}

#[test]
fn unknown_fields_ride_in_extra() {
    let state = GameState::from_value(json!({
        "captcha": false,
        "adventure_count": 3,
    }))
    .unwrap();
    assert_eq!(state.extra["adventure_count"], json!(3));
}

#[test]
fn missing_logged_in_is_none() {
    let state = GameState::from_value(json!({"captcha": true})).unwrap();
    assert_eq!(state.logged_in, None);
    assert!(state.captcha);
}

#[test]
fn fill_pct_uses_granary_for_crop() {
    let state = GameState {
        resources: Some(Resources { wood: 400, clay: 0, iron: 0, crop: 90 }),
        capacity: Some(Capacity { warehouse: 800, granary: 300 }),
        ..Default::default()
    };
    assert_eq!(state.fill_pct(ResourceKind::Wood), Some(50));
    assert_eq!(state.fill_pct(ResourceKind::Crop), Some(30));
}

#[test]
fn fill_pct_absent_without_capacity() {
    let state = GameState {
        resources: Some(Resources { wood: 100, ..Default::default() }),
        ..Default::default()
    };
    assert_eq!(state.fill_pct(ResourceKind::Wood), None);
}

#[test]
fn fill_pct_caps_at_100() {
    let state = GameState {
        resources: Some(Resources { wood: 9_999, ..Default::default() }),
        capacity: Some(Capacity { warehouse: 800, granary: 800 }),
        ..Default::default()
    };
    assert_eq!(state.fill_pct(ResourceKind::Wood), Some(100));
}

#[test]
fn lowest_fill_finds_scarcest() {
    let state = GameState {
        resources: Some(Resources { wood: 80, clay: 400, iron: 600, crop: 700 }),
        capacity: Some(Capacity { warehouse: 800, granary: 800 }),
        ..Default::default()
    };
    assert_eq!(state.lowest_fill_pct(), Some((ResourceKind::Wood, 10)));
}

#[test]
fn resources_accessors() {
    let mut r = Resources::default();
    assert!(r.is_zero());
    r.set(ResourceKind::Iron, 50);
    assert_eq!(r.get(ResourceKind::Iron), 50);
    assert!(!r.is_zero());
}
