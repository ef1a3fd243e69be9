// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! reeve-engine: the per-server bot engine and its collaborators.
//!
//! One [`BotEngine`] drives one game server: a jittered scheduler ticks
//! the main loop, which scans the page through the [`ExecutorBridge`],
//! asks the [`Strategy`] what to do, executes at most one task, and
//! persists forward progress. All of it is poked externally (timers,
//! heartbeats, supervisor commands); a cycle lock keeps the phases of
//! one cycle atomic against those pokes.

pub mod bot;
pub mod bridge;
pub mod cooldown;
pub mod scheduler;
pub mod strategy;
pub mod transport;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use bot::{BotEngine, EngineDeps, EngineError, EngineStatus};
pub use bridge::{BridgeError, ExecutorBridge};
pub use cooldown::CooldownMap;
pub use scheduler::{CycleStatus, Scheduler};
pub use strategy::{NoopStrategy, Strategy, TaskProposal};
pub use transport::{PageTransport, TabId, TransportError};
