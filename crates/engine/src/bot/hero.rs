// SPDX-License-Identifier: MIT

//! Hero resource claims: topping up a starving warehouse from the hero's
//! inventory, either proactively or as a fallback after a build failed on
//! insufficient resources.

use super::execute::EXECUTOR_WAIT;
use super::BotEngine;
use crate::strategy::Strategy;
use crate::transport::{PageTransport, TabId};
use reeve_core::{Clock, GameState, PageAction, ResourceKind, Resources, Task};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

/// Cooldown key shared by both claim variants.
pub(crate) const HERO_CLAIM_KEY: &str = "hero_claim";

const CLAIM_COOLDOWN: Duration = Duration::from_secs(300);
const CLAIM_FAIL_COOLDOWN: Duration = Duration::from_secs(120);

/// What a hero inventory scan reports.
#[derive(Debug, Default, Deserialize)]
struct HeroInventory {
    #[serde(default)]
    version: Option<u32>,
    #[serde(default)]
    items: Vec<HeroItem>,
}

#[derive(Debug, Deserialize)]
struct HeroItem {
    resource: String,
    #[serde(default)]
    amount: u64,
}

impl HeroInventory {
    fn available(&self, kind: ResourceKind) -> u64 {
        self.items
            .iter()
            .filter(|i| i.resource == kind.to_string())
            .map(|i| i.amount)
            .sum()
    }
}

impl<T, S, C> BotEngine<T, S, C>
where
    T: PageTransport,
    S: Strategy,
    C: Clock,
{
    /// Proactive claim: any resource below the low-water mark, hero home,
    /// claim cooldown elapsed. Returns true when it consumed the cycle.
    pub(super) async fn maybe_proactive_hero_claim(&self, tab: TabId, state: &GameState) -> bool {
        let now_ms = self.clock.epoch_ms();
        let fill_target = self.with_state(|s| {
            if !s.config.safety.hero_resource_claim {
                return None;
            }
            if s.cooldowns.is_active(HERO_CLAIM_KEY, now_ms) {
                return None;
            }
            let hero = state.hero.as_ref()?;
            if !hero.at_home {
                return None;
            }
            let (_, pct) = state.lowest_fill_pct()?;
            (pct < s.config.safety.hero_low_pct).then_some(s.config.safety.hero_fill_pct)
        });
        let Some(fill_target) = fill_target else { return false };

        let want = deficits_to_target(state, fill_target);
        if want.is_zero() {
            return false;
        }
        self.logger.info(
            format!(
                "hero claim: topping up to {fill_target}% (wood {} clay {} iron {} crop {})",
                want.wood, want.clay, want.iron, want.crop
            ),
            None,
        );
        self.run_hero_claim(tab, want).await
    }

    /// Reactive claim after a build task failed on insufficient resources.
    /// Computes the deficit against the task's known cost when present.
    pub(super) async fn reactive_hero_claim(&self, tab: TabId, task: &Task) -> bool {
        let Some(state) = self.with_state(|s| s.game.clone()) else { return false };
        let want = match (&task.params.cost, state.resources) {
            (Some(cost), Some(have)) => {
                let mut want = Resources::default();
                for kind in ResourceKind::ALL {
                    want.set(kind, cost.get(kind).saturating_sub(have.get(kind)));
                }
                want
            }
            _ => deficits_to_target(&state, 50),
        };
        if want.is_zero() {
            return false;
        }
        self.logger.info(
            format!("hero fallback for task {}: claiming missing resources", task.id),
            None,
        );
        self.run_hero_claim(tab, want).await
    }

    /// Navigate to the hero inventory, scan it, and transfer `want`.
    /// Sets the claim cooldown (shorter on failure).
    async fn run_hero_claim(&self, tab: TabId, want: Resources) -> bool {
        let claimed = self.run_hero_claim_inner(tab, want).await;
        self.with_state(|s| {
            let cooldown = if claimed { CLAIM_COOLDOWN } else { CLAIM_FAIL_COOLDOWN };
            s.cooldowns.set(HERO_CLAIM_KEY, cooldown, self.clock.epoch_ms());
            if claimed {
                s.stats.hero_claims += 1;
            }
        });
        if !claimed {
            self.logger.warn("hero claim failed", None);
        }
        claimed
    }

    async fn run_hero_claim_inner(&self, tab: TabId, want: Resources) -> bool {
        let nav = self
            .bridge
            .execute(tab, PageAction::NavigateTo, json!({"page": "hero_inventory"}))
            .await;
        if !nav.map(|r| r.success).unwrap_or(false) {
            return false;
        }
        self.bridge.wait_for_content_script(tab, EXECUTOR_WAIT).await;
        self.human_delay().await;

        let scanned = match self.bridge.execute(tab, PageAction::ScanHeroInventory, Value::Null).await
        {
            Ok(result) if result.success => result.data.unwrap_or(Value::Null),
            _ => return false,
        };
        let inventory: HeroInventory = serde_json::from_value(scanned).unwrap_or_default();
        let version = inventory
            .version
            .or_else(|| {
                self.with_state(|s| {
                    s.game.as_ref().and_then(|g| g.hero.as_ref()).and_then(|h| h.inventory_version)
                })
            })
            .unwrap_or(1);

        if version >= 2 {
            // One bulk transfer of every deficit
            let result = self
                .bridge
                .execute(
                    tab,
                    PageAction::UseHeroItemBulk,
                    json!({"transfers": {
                        "wood": want.wood,
                        "clay": want.clay,
                        "iron": want.iron,
                        "crop": want.crop,
                    }}),
                )
                .await;
            return result.map(|r| r.success).unwrap_or(false);
        }

        // Version 1 UI: one transfer per resource type
        let mut any = false;
        for kind in ResourceKind::ALL {
            let amount = want.get(kind).min(inventory.available(kind));
            if amount == 0 {
                continue;
            }
            let result = self
                .bridge
                .execute(
                    tab,
                    PageAction::UseHeroItem,
                    json!({"resource": kind.to_string(), "amount": amount}),
                )
                .await;
            if result.map(|r| r.success).unwrap_or(false) {
                any = true;
            }
            self.human_delay().await;
        }
        any
    }
}

/// Deficit of each resource against `pct`% of its storage capacity.
fn deficits_to_target(state: &GameState, pct: u32) -> Resources {
    let mut want = Resources::default();
    let (Some(have), Some(capacity)) = (state.resources, state.capacity.as_ref()) else {
        return want;
    };
    for kind in ResourceKind::ALL {
        let target = capacity.for_kind(kind) * pct as u64 / 100;
        want.set(kind, target.saturating_sub(have.get(kind)));
    }
    want
}

#[cfg(test)]
#[path = "hero_tests.rs"]
mod tests;
