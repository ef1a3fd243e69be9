// SPDX-License-Identifier: MIT

use reeve_core::ServerKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Request from the operator UI or a page script to the supervisor.
///
/// Page-originated requests usually omit `server`; the supervisor
/// resolves them through the originating tab (falling back to the
/// ServerKey derived from the page URL).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    /// List known servers and their engine states
    #[serde(rename = "GET_SERVERS")]
    GetServers,

    /// Status of one instance
    #[serde(rename = "GET_STATUS")]
    GetStatus {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        server: Option<ServerKey>,
    },

    #[serde(rename = "START_BOT")]
    StartBot { server: ServerKey },

    #[serde(rename = "STOP_BOT")]
    StopBot { server: ServerKey },

    /// Pause or resume (pause = false)
    #[serde(rename = "PAUSE_BOT")]
    PauseBot {
        server: ServerKey,
        #[serde(default = "default_true")]
        pause: bool,
    },

    #[serde(rename = "EMERGENCY_STOP")]
    EmergencyStop {
        server: ServerKey,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// Persist a config record for one server
    #[serde(rename = "SAVE_CONFIG")]
    SaveConfig { server: ServerKey, config: Value },

    #[serde(rename = "GET_LOGS")]
    GetLogs {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        server: Option<ServerKey>,
    },

    #[serde(rename = "GET_QUEUE")]
    GetQueue { server: ServerKey },

    #[serde(rename = "ADD_TASK")]
    AddTask {
        server: ServerKey,
        kind: reeve_core::TaskKind,
        #[serde(default)]
        params: Value,
        #[serde(default = "default_priority")]
        priority: u8,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        village_id: Option<String>,
    },

    #[serde(rename = "REMOVE_TASK")]
    RemoveTask { server: ServerKey, id: reeve_core::TaskId },

    #[serde(rename = "CLEAR_QUEUE")]
    ClearQueue { server: ServerKey },

    #[serde(rename = "GET_STRATEGY")]
    GetStrategy { server: ServerKey },

    /// Farm intelligence collected by the page executor, passed through
    #[serde(rename = "GET_FARM_INTEL")]
    GetFarmIntel { server: ServerKey },

    /// Full dorf1+dorf2 scan driven from the supervisor
    #[serde(rename = "REQUEST_SCAN")]
    RequestScan { server: ServerKey },

    /// Page-level API POST that needs session cookies
    #[serde(rename = "FARM_LIST_API_CALL")]
    FarmListApiCall {
        server: ServerKey,
        url: String,
        #[serde(default)]
        body: Value,
        /// Session cookies supplied by the page bridge
        #[serde(default)]
        cookies: HashMap<String, String>,
        /// Client game version for the X-Version header (opaque)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
    },

    #[serde(rename = "SWITCH_VILLAGE")]
    SwitchVillage { server: ServerKey, village_id: String },

    /// Hello from a freshly injected page script
    #[serde(rename = "CONTENT_READY")]
    ContentReady { url: String },

    #[serde(rename = "SCAN_FARM_TARGETS")]
    ScanFarmTargets { server: ServerKey },
}

fn default_true() -> bool {
    true
}

fn default_priority() -> u8 {
    5
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
