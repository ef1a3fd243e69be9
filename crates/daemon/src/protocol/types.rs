// SPDX-License-Identifier: MIT

//! DTO structs for the IPC protocol.

use reeve_core::{BotState, ServerKey};
use serde::{Deserialize, Serialize};

/// One row of `GET_SERVERS`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSummary {
    pub server: ServerKey,
    pub label: String,
    pub last_used_at_ms: u64,
    /// An engine exists for this server in the current process
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<BotState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab: Option<reeve_engine::TabId>,
}
