// SPDX-License-Identifier: MIT

//! Daemon paths and configuration file.

use serde::Deserialize;
use std::path::PathBuf;

/// Protocol version spoken on the operator socket.
pub const PROTOCOL_VERSION: u32 = 1;

/// `~/.config/reeve/reeved.toml`, all fields optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// State directory override (default: platform state dir + "reeve").
    pub state_dir: Option<PathBuf>,
    /// TCP port the WebSocket bridge listens on (loopback only).
    pub ws_port: Option<u16>,
    /// Daemon log file directory.
    pub log_dir: Option<PathBuf>,
}

impl DaemonConfig {
    pub fn load() -> Self {
        let Some(path) = config_file() else { return Self::default() };
        let Ok(raw) = std::fs::read_to_string(&path) else { return Self::default() };
        match toml::from_str(&raw) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "bad config file ignored");
                Self::default()
            }
        }
    }

    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(|| {
            dirs::state_dir()
                .or_else(dirs::data_local_dir)
                .unwrap_or_else(|| PathBuf::from("."))
                .join("reeve")
        })
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| self.state_dir().join("logs"))
    }

    pub fn ws_port(&self) -> u16 {
        self.ws_port.unwrap_or(8719)
    }
}

fn config_file() -> Option<PathBuf> {
    Some(dirs::config_dir()?.join("reeve").join("reeved.toml"))
}

/// Path of the operator socket.
pub fn socket_path(state_dir: &std::path::Path) -> PathBuf {
    state_dir.join("reeved.sock")
}

/// Path of the single-instance lock file.
pub fn lock_path(state_dir: &std::path::Path) -> PathBuf {
    state_dir.join("reeved.lock")
}
