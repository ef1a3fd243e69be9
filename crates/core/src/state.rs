// SPDX-License-Identifier: MIT

//! Engine FSM states and the cycle-lock phases.
//!
//! The transition table is the single source of truth for engine state;
//! anything not listed here is rejected by the engine with a warning.

use serde::{Deserialize, Serialize};

/// State of one bot engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotState {
    Stopped,
    Idle,
    Scanning,
    Deciding,
    Executing,
    Cooldown,
    Paused,
    Emergency,
}

crate::simple_display! {
    BotState {
        Stopped => "stopped",
        Idle => "idle",
        Scanning => "scanning",
        Deciding => "deciding",
        Executing => "executing",
        Cooldown => "cooldown",
        Paused => "paused",
        Emergency => "emergency",
    }
}

impl BotState {
    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: BotState) -> bool {
        use BotState::*;
        if self == next {
            return false;
        }
        match self {
            Stopped => matches!(next, Scanning | Idle),
            Scanning => matches!(next, Deciding | Idle | Paused | Emergency | Stopped),
            Deciding => matches!(next, Executing | Idle | Paused | Emergency | Stopped),
            Executing => matches!(next, Cooldown | Idle | Scanning | Paused | Emergency | Stopped),
            Cooldown => matches!(next, Scanning | Idle | Paused | Emergency | Stopped),
            Idle => matches!(next, Scanning | Paused | Emergency | Stopped),
            Paused => matches!(next, Idle | Scanning | Emergency | Stopped),
            Emergency => matches!(next, Stopped),
        }
    }

    /// The engine performs cycles in this state.
    pub fn is_running(self) -> bool {
        !matches!(self, BotState::Stopped | BotState::Emergency)
    }

    /// Mid-cycle states that return to Idle when a cycle unwinds.
    pub fn is_cycle_state(self) -> bool {
        matches!(self, BotState::Scanning | BotState::Deciding | BotState::Cooldown)
    }
}

/// Phase tag held in the cycle lock while a cycle is in flight.
///
/// A non-empty lock blocks re-entry to the main loop; the full
/// scan → decide → execute → return trajectory holds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    Scanning,
    Deciding,
    Executing,
    Returning,
}

crate::simple_display! {
    CyclePhase {
        Scanning => "scanning",
        Deciding => "deciding",
        Executing => "executing",
        Returning => "returning",
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
