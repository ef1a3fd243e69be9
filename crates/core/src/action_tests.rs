// SPDX-License-Identifier: MIT

use super::*;
use serde_json::json;

#[test]
fn scan_wire_shape() {
    let json = serde_json::to_value(&ExecutorRequest::Scan).unwrap();
    assert_eq!(json, json!({"type": "SCAN"}));
}

#[test]
fn execute_wire_shape() {
    let req = ExecutorRequest::Execute {
        action: PageAction::ClickResourceField,
        params: json!({"fieldId": 3}),
        request_id: 17,
    };
    let value = serde_json::to_value(&req).unwrap();
    assert_eq!(value["type"], "EXECUTE");
    assert_eq!(value["action"], "clickResourceField");
    assert_eq!(value["_requestId"], 17);
    assert_eq!(value["params"]["fieldId"], 3);
}

#[test]
fn get_state_wire_shape() {
    let req = ExecutorRequest::GetState { params: GetStateParams { property: "page".into() } };
    let value = serde_json::to_value(&req).unwrap();
    assert_eq!(value, json!({"type": "GET_STATE", "params": {"property": "page"}}));
}

#[test]
fn action_names_are_camel_case() {
    assert_eq!(serde_json::to_string(&PageAction::SendHeroAdventure).unwrap(), "\"sendHeroAdventure\"");
    assert_eq!(PageAction::BuildNewByGid.to_string(), "buildNewByGid");
}

#[yare::parameterized(
    navigate = { PageAction::NavigateTo, true },
    field    = { PageAction::ClickResourceField, true },
    upgrade  = { PageAction::ClickUpgradeButton, true },
    switch   = { PageAction::SwitchVillage, true },
    train    = { PageAction::TrainTroops, false },
    farm     = { PageAction::SendFarmList, false },
    scan_inv = { PageAction::ScanHeroInventory, false },
)]
fn page_reload_classification(action: PageAction, expected: bool) {
    assert_eq!(action.reloads_page(), expected);
}

#[test]
fn notify_uses_action_discriminator() {
    let msg = NotifyMessage::new("emergency", "Captcha detected on page");
    let value = serde_json::to_value(&msg).unwrap();
    assert_eq!(value["action"], "NOTIFY");
    assert_eq!(value["data"]["type"], "emergency");
    assert_eq!(value["data"]["message"], "Captcha detected on page");
}

#[test]
fn exec_result_reason_parsing() {
    let result: ExecResult =
        serde_json::from_value(json!({"success": false, "reason": "queue_full"})).unwrap();
    assert_eq!(result.fail_reason(), Some(crate::reason::FailReason::QueueFull));

    let ok: ExecResult = serde_json::from_value(json!({"success": true})).unwrap();
    assert_eq!(ok.fail_reason(), None);
}

#[test]
fn exec_result_tolerates_extra_fields() {
    let result: ExecResult = serde_json::from_value(json!({
        "success": true,
        "data": {"villages": []},
    }))
    .unwrap();
    assert!(result.success);
    assert!(result.data.is_some());
}
