// SPDX-License-Identifier: MIT

//! Server identity and the process-wide server registry record.
//!
//! A [`ServerKey`] is the partition key for all per-instance state: an
//! opaque lowercase string derived from the origin hostname of a game URL.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::BTreeMap;

/// Key used when a server cannot be derived from a URL (legacy migration).
pub const UNKNOWN_SERVER: &str = "unknown_server";

/// Opaque lowercase identifier for one remote game origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerKey(SmolStr);

impl ServerKey {
    /// Wrap an already-normalized key (used when reading persisted records).
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(SmolStr::new(key.as_ref()))
    }

    /// Derive a key from a page URL.
    ///
    /// Takes the hostname of the origin, lowercased, with any character
    /// outside `[a-z0-9.-]` replaced by `_`. Returns [`UNKNOWN_SERVER`]
    /// when no hostname can be extracted.
    pub fn from_url(url: &str) -> Self {
        let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
        // Strip credentials, path, port, query, fragment
        let rest = rest.rsplit_once('@').map(|(_, r)| r).unwrap_or(rest);
        let host: String = rest
            .chars()
            .take_while(|c| !matches!(c, '/' | ':' | '?' | '#'))
            .collect();
        if host.is_empty() {
            return Self(SmolStr::new_static(UNKNOWN_SERVER));
        }
        let normalized: String = host
            .chars()
            .map(|c| {
                let c = c.to_ascii_lowercase();
                if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        Self(SmolStr::new(normalized))
    }

    pub fn unknown() -> Self {
        Self(SmolStr::new_static(UNKNOWN_SERVER))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN_SERVER
    }
}

impl std::fmt::Display for ServerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl AsRef<str> for ServerKey {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for ServerKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// One registry row: display label plus bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub last_used_at_ms: u64,
    /// Set when this entry was created by the legacy single-server migration.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub migrated_from_legacy: bool,
}

/// Process-wide mapping of known servers. Persisted as a single record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerRegistry {
    pub servers: BTreeMap<ServerKey, RegistryEntry>,
}

impl ServerRegistry {
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn touch(&mut self, key: &ServerKey, now_ms: u64) {
        let entry = self.servers.entry(key.clone()).or_default();
        entry.last_used_at_ms = now_ms;
        if entry.label.is_empty() {
            entry.label = key.to_string();
        }
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
