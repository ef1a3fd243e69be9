// SPDX-License-Identifier: MIT

use super::super::test_helpers::*;
use super::HERO_CLAIM_KEY;
use crate::strategy::TaskProposal;
use reeve_core::test_support::{field_params, logged_in_state};
use reeve_core::{Capacity, Clock, ExecResult, PageAction, Resources, TaskKind, TaskStatus};
use serde_json::json;

fn starving_state(hero_home: bool) -> reeve_core::GameState {
    let mut state = logged_in_state();
    state.resources = Some(Resources { wood: 80, clay: 500, iron: 500, crop: 400 });
    state.capacity = Some(Capacity { warehouse: 800, granary: 800 });
    if let Some(hero) = &mut state.hero {
        hero.at_home = hero_home;
    }
    state
}

fn stocked_inventory(h: &Harness) {
    h.transport.push_execute_result(
        PageAction::ScanHeroInventory,
        ExecResult::ok_with(json!({
            "version": 1,
            "items": [
                {"resource": "wood", "amount": 1000},
                {"resource": "crop", "amount": 200},
            ],
        })),
    );
}

#[tokio::test]
async fn proactive_claim_short_circuits_cycle() {
    let h = started_harness().await;
    h.transport.set_default_scan(starving_state(true));
    stocked_inventory(&h);
    h.strategy.push_proposals(vec![
        TaskProposal::new(TaskKind::UpgradeResource, field_params(3), 5).for_village("v1"),
    ]);

    h.engine.tick_main_loop().await;

    // The claim consumed the cycle; the proposed task waits for the next one
    let actions = h.transport.executed_actions();
    assert!(actions.contains(&PageAction::ScanHeroInventory));
    assert!(actions.contains(&PageAction::UseHeroItem));
    assert!(!actions.contains(&PageAction::ClickResourceField));

    let status = h.engine.status();
    assert_eq!(status.stats.hero_claims, 1);
    assert_eq!(status.pending_tasks, 1);
    assert_eq!(h.engine.queue_tasks()[0].status, TaskStatus::Pending);
}

#[tokio::test]
async fn claim_transfers_up_to_the_fill_target() {
    let h = started_harness().await;
    h.transport.set_default_scan(starving_state(true));
    stocked_inventory(&h);

    h.engine.tick_main_loop().await;

    // Fill target is 50% of 800 = 400; wood 80 -> wants 320, capped by stock
    let transfers: Vec<_> = h
        .transport
        .sent()
        .into_iter()
        .filter_map(|(_, req)| match req {
            reeve_core::ExecutorRequest::Execute { action: PageAction::UseHeroItem, params, .. } => {
                Some(params)
            }
            _ => None,
        })
        .collect();
    assert_eq!(transfers.len(), 1, "only wood is below target and in stock");
    assert_eq!(transfers[0]["resource"], "wood");
    assert_eq!(transfers[0]["amount"], 320);
}

#[tokio::test]
async fn no_claim_when_hero_away() {
    let h = started_harness().await;
    h.transport.set_default_scan(starving_state(false));

    h.engine.tick_main_loop().await;

    assert!(!h.transport.executed_actions().contains(&PageAction::ScanHeroInventory));
    assert_eq!(h.engine.status().stats.hero_claims, 0);
}

#[tokio::test]
async fn no_claim_while_cooldown_active() {
    let h = started_harness().await;
    h.transport.set_default_scan(starving_state(true));
    stocked_inventory(&h);

    h.engine.tick_main_loop().await;
    assert_eq!(h.engine.status().stats.hero_claims, 1);

    // Second cycle inside the 5-minute cooldown: no second claim
    h.engine.tick_main_loop().await;
    assert_eq!(h.engine.status().stats.hero_claims, 1);

    let now = h.clock.epoch_ms();
    h.engine.with_state(|s| assert!(s.cooldowns.is_active(HERO_CLAIM_KEY, now)));
}

#[tokio::test]
async fn failed_claim_gets_short_cooldown() {
    let h = started_harness().await;
    h.transport.set_default_scan(starving_state(true));
    h.transport.push_execute_error(
        PageAction::NavigateTo,
        crate::transport::TransportError::TabGone(TAB),
    );

    h.engine.tick_main_loop().await;

    assert_eq!(h.engine.status().stats.hero_claims, 0);
    let now = h.clock.epoch_ms();
    h.engine.with_state(|s| {
        let remaining = s.cooldowns.remaining(HERO_CLAIM_KEY, now).unwrap_or_default();
        assert_eq!(remaining.as_secs(), 120);
    });
}

#[tokio::test]
async fn claim_disabled_by_config() {
    let h = started_harness().await;
    h.engine.with_state(|s| s.config.safety.hero_resource_claim = false);
    h.transport.set_default_scan(starving_state(true));

    h.engine.tick_main_loop().await;

    assert!(!h.transport.executed_actions().contains(&PageAction::ScanHeroInventory));
}
