// SPDX-License-Identifier: MIT

//! Request/response bridge to the page executor.
//!
//! Owns the policies that make the channel safe to drive a game through:
//! an adaptive timeout, monotonic request ids so the executor can discard
//! replays, a short retry ladder for the not-yet-attached window after a
//! navigation, and the liveness ping loop used after page reloads.

use crate::transport::{PageTransport, TabId, TransportError};
use reeve_core::{ExecResult, ExecutorRequest, GameState, GetStateParams, NotifyMessage, PageAction};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Starting request timeout.
pub const BASE_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout ceiling after repeated timeouts.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(60);
/// Timeout growth per timeout.
pub const TIMEOUT_STEP: Duration = Duration::from_secs(10);

/// Retries for transient "no executor attached" errors.
const TRANSIENT_RETRIES: u32 = 2;

/// Liveness ping: per-attempt timeout and gap between attempts.
const PING_TIMEOUT: Duration = Duration::from_millis(1500);
const PING_GAP: Duration = Duration::from_millis(800);

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("executor timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("executor refused: {0}")]
    Refused(String),
    #[error("malformed executor response: {0}")]
    Malformed(String),
}

/// The engine's handle to one page executor.
pub struct ExecutorBridge<T> {
    transport: Arc<T>,
    request_seq: AtomicU64,
    timeout_ms: AtomicU64,
}

impl<T: PageTransport> ExecutorBridge<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            request_seq: AtomicU64::new(0),
            timeout_ms: AtomicU64::new(BASE_TIMEOUT.as_millis() as u64),
        }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Current adaptive timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(Ordering::Relaxed))
    }

    /// One request/response exchange with timeout and transient retry.
    ///
    /// When the timeout fires the in-flight future is dropped, which
    /// settles the request: a response arriving later has no waiter and
    /// is discarded by the transport. Retries reuse the same request, so
    /// an EXECUTE keeps its request id across the ladder.
    async fn request(&self, tab: TabId, request: ExecutorRequest) -> Result<Value, BridgeError> {
        let mut attempt = 0;
        loop {
            let timeout = self.timeout();
            match tokio::time::timeout(timeout, self.transport.send(tab, request.clone())).await {
                Ok(Ok(value)) => {
                    self.timeout_ms.store(BASE_TIMEOUT.as_millis() as u64, Ordering::Relaxed);
                    return Ok(value);
                }
                Ok(Err(err)) if err.is_transient() && attempt < TRANSIENT_RETRIES => {
                    attempt += 1;
                    tracing::debug!(tab, attempt, error = %err, "transient transport error, retrying");
                    tokio::time::sleep(Duration::from_secs(attempt as u64)).await;
                }
                Ok(Err(err)) => return Err(err.into()),
                Err(_elapsed) => {
                    let bumped =
                        (timeout + TIMEOUT_STEP).min(MAX_TIMEOUT).as_millis() as u64;
                    self.timeout_ms.store(bumped, Ordering::Relaxed);
                    tracing::warn!(tab, timeout_ms = timeout.as_millis() as u64, "executor request timed out");
                    return Err(BridgeError::Timeout(timeout));
                }
            }
        }
    }

    /// Full game-state scan.
    pub async fn scan(&self, tab: TabId) -> Result<GameState, BridgeError> {
        let value = self.request(tab, ExecutorRequest::Scan).await?;
        let result: ExecResult = serde_json::from_value(value)
            .map_err(|e| BridgeError::Malformed(format!("scan envelope: {e}")))?;
        if !result.success {
            let why = result.error.or(result.message).unwrap_or_else(|| "scan failed".into());
            return Err(BridgeError::Refused(why));
        }
        let data = result.data.ok_or_else(|| BridgeError::Malformed("scan without data".into()))?;
        GameState::from_value(data)
            .ok_or_else(|| BridgeError::Malformed("unparseable game state".into()))
    }

    /// Invoke a named page action.
    pub async fn execute(
        &self,
        tab: TabId,
        action: PageAction,
        params: Value,
    ) -> Result<ExecResult, BridgeError> {
        let request_id = self.request_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let value = self
            .request(tab, ExecutorRequest::Execute { action, params, request_id })
            .await?;
        serde_json::from_value(value)
            .map_err(|e| BridgeError::Malformed(format!("execute envelope: {e}")))
    }

    /// Cheap single-property probe.
    pub async fn get_state(&self, tab: TabId, property: &str) -> Result<ExecResult, BridgeError> {
        let value = self
            .request(
                tab,
                ExecutorRequest::GetState {
                    params: GetStateParams { property: property.to_string() },
                },
            )
            .await?;
        serde_json::from_value(value)
            .map_err(|e| BridgeError::Malformed(format!("get_state envelope: {e}")))
    }

    /// Fire-and-forget notice shown by the page. Errors are swallowed.
    pub async fn notify(&self, tab: TabId, kind: &str, message: &str) {
        if let Err(err) = self.transport.notify(tab, NotifyMessage::new(kind, message)).await {
            tracing::debug!(tab, error = %err, "page notify failed");
        }
    }

    /// Ping the executor until it answers or `max` elapses.
    ///
    /// Used after every navigation that reloads the page: the fresh
    /// content script takes a moment to attach.
    pub async fn wait_for_content_script(&self, tab: TabId, max: Duration) -> bool {
        let started = tokio::time::Instant::now();
        loop {
            let probe = self.transport.send(
                tab,
                ExecutorRequest::GetState { params: GetStateParams { property: "page".into() } },
            );
            if let Ok(Ok(value)) = tokio::time::timeout(PING_TIMEOUT, probe).await {
                let ok = serde_json::from_value::<ExecResult>(value)
                    .map(|r| r.success)
                    .unwrap_or(false);
                if ok {
                    return true;
                }
            }
            if started.elapsed() >= max {
                tracing::warn!(tab, max_ms = max.as_millis() as u64, "executor did not come back");
                return false;
            }
            tokio::time::sleep(PING_GAP).await;
        }
    }
}

#[cfg(test)]
#[path = "bridge_tests.rs"]
mod tests;
