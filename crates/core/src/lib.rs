// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! reeve-core: domain types for the Reeve automation supervisor

pub mod macros;

pub mod action;
pub mod clock;
pub mod config;
pub mod game;
pub mod log;
pub mod queue;
pub mod reason;
pub mod runstate;
pub mod server;
pub mod state;
pub mod stats;
pub mod task;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use action::{ExecResult, ExecutorRequest, GetStateParams, NotifyMessage, PageAction};
pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{BotConfig, DelayConfig, FarmConfig, SafetyConfig, TroopConfig, VillageConfig};
pub use game::{Capacity, GameState, HeroState, ResourceKind, Resources, VillageInfo};
pub use log::{LogEntry, LogLevel, LogRing, MAX_LOG_ENTRIES};
pub use queue::{TaskQueue, MAX_RUNNING_AGE, RECOVERY_CHECK_INTERVAL, TERMINAL_TASK_TTL};
pub use reason::{fail_cooldown, success_cooldown, FailReason};
pub use runstate::{EmergencyRecord, PersistedRunState};
pub use server::{RegistryEntry, ServerKey, ServerRegistry};
pub use state::{BotState, CyclePhase};
pub use stats::BotStats;
#[cfg(any(test, feature = "test-support"))]
pub use task::TaskBuilder;
pub use task::{Task, TaskId, TaskKind, TaskParams, TaskStatus, DEFAULT_MAX_RETRIES};
