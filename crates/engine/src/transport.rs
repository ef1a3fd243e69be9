// SPDX-License-Identifier: MIT

//! The seam between the engine and the page executor's message channel.

use async_trait::async_trait;
use reeve_core::{ExecutorRequest, NotifyMessage};
use serde_json::Value;
use thiserror::Error;

/// Browser tab identifier.
pub type TabId = i64;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    /// No executor is attached to the tab right now. The classic window:
    /// the page navigated and the fresh content script has not yet loaded.
    #[error("receiving end does not exist: {0}")]
    NotAttached(String),
    #[error("tab {0} is gone")]
    TabGone(TabId),
    #[error("transport closed")]
    Closed,
    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Worth an immediate retry with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::NotAttached(_))
    }
}

/// Message channel to the executor embedded in a game page.
///
/// One send corresponds to one request/response exchange; responses to
/// requests whose caller has given up (timeout) must be discarded by the
/// implementation, never delivered late.
#[async_trait]
pub trait PageTransport: Send + Sync + 'static {
    async fn send(&self, tab: TabId, request: ExecutorRequest) -> Result<Value, TransportError>;

    /// Fire-and-forget message to the page; no response expected.
    async fn notify(&self, tab: TabId, message: NotifyMessage) -> Result<(), TransportError>;

    /// Whether the tab still exists on the host (not whether an executor
    /// is attached to it).
    async fn tab_exists(&self, tab: TabId) -> bool;
}
