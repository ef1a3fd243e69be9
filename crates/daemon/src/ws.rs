// SPDX-License-Identifier: MIT

//! WebSocket bridge to page executors.
//!
//! Each game tab's content script opens one connection and introduces
//! itself with a HELLO carrying its tab id and page URL. Requests to the
//! executor are correlated by id; a response whose waiter has given up
//! (bridge timeout) finds no pending entry and is discarded, which is
//! what makes the bridge's settled-flag semantics hold end to end.

use crate::protocol::{Request, Response};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use reeve_core::{ExecutorRequest, NotifyMessage};
use reeve_engine::{PageTransport, TabId, TransportError};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

/// How long a connection gets to say HELLO before being dropped.
const HELLO_TIMEOUT: Duration = Duration::from_secs(10);

/// Events surfaced to the supervisor.
#[derive(Debug)]
pub enum PageEvent {
    /// A tab's executor connected (or reconnected) with this page URL.
    TabUpdated { tab: TabId, url: String },
    /// The executor connection dropped. Happens on every navigation;
    /// only a missing reconnect means the tab is actually gone.
    ExecutorDetached { tab: TabId },
    /// A page script sent a supervisor command.
    Command { tab: TabId, request: Request, reply: oneshot::Sender<Response> },
}

struct Connection {
    /// Identifies this connection generation so a stale close does not
    /// evict a fresh reconnect.
    generation: u64,
    tx: mpsc::UnboundedSender<Message>,
    url: String,
}

/// A waiter for one in-flight request, tagged with the connection
/// generation it was sent on so a dying connection can fail it.
struct PendingEntry {
    generation: u64,
    tx: oneshot::Sender<Value>,
}

/// The daemon-side page transport over WebSocket connections.
pub struct WsTransport {
    connections: Mutex<HashMap<TabId, Connection>>,
    pending: Mutex<HashMap<u64, PendingEntry>>,
    seq: AtomicU64,
    generation_seq: AtomicU64,
    events_tx: mpsc::Sender<PageEvent>,
}

#[derive(Debug, Deserialize)]
struct HelloFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "tabId")]
    tab_id: TabId,
    url: String,
}

/// Removes the pending entry when the waiter goes away, so an abandoned
/// request cannot leak or receive a late response.
struct PendingGuard<'a> {
    transport: &'a WsTransport,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.transport.pending.lock().remove(&self.id);
    }
}

impl WsTransport {
    pub fn new(events_tx: mpsc::Sender<PageEvent>) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            seq: AtomicU64::new(0),
            generation_seq: AtomicU64::new(0),
            events_tx,
        }
    }

    /// Accept executor connections until cancelled.
    pub async fn serve(self: Arc<Self>, listener: TcpListener, cancel: CancellationToken) {
        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => return,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, peer)) => {
                    tracing::debug!(%peer, "executor connection accepted");
                    let transport = self.clone();
                    tokio::spawn(async move {
                        if let Err(err) = transport.handle_connection(stream).await {
                            tracing::debug!(error = %err, "executor connection ended");
                        }
                    });
                }
                Err(err) => {
                    tracing::warn!(error = %err, "accept failed");
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
            }
        }
    }

    async fn handle_connection(self: Arc<Self>, stream: TcpStream) -> Result<(), String> {
        let ws = tokio_tungstenite::accept_async(stream).await.map_err(|e| e.to_string())?;
        let (mut sink, mut source) = ws.split();

        // First frame must be the HELLO
        let hello = tokio::time::timeout(HELLO_TIMEOUT, source.next())
            .await
            .map_err(|_| "no HELLO before timeout".to_string())?
            .ok_or("closed before HELLO")?
            .map_err(|e| e.to_string())?;
        let hello: HelloFrame = match hello {
            Message::Text(text) => serde_json::from_str(&text).map_err(|e| e.to_string())?,
            other => return Err(format!("unexpected first frame: {other:?}")),
        };
        if hello.kind != "HELLO" {
            return Err(format!("expected HELLO, got {}", hello.kind));
        }
        let tab = hello.tab_id;
        let generation = self.generation_seq.fetch_add(1, Ordering::Relaxed) + 1;

        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        self.connections
            .lock()
            .insert(tab, Connection { generation, tx, url: hello.url.clone() });
        let _ = self
            .events_tx
            .send(PageEvent::TabUpdated { tab, url: hello.url.clone() })
            .await;
        tracing::info!(tab, url = %hello.url, "executor attached");

        // Writer half
        let writer = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if sink.send(message).await.is_err() {
                    break;
                }
            }
        });

        // Reader half
        while let Some(frame) = source.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) | Err(_) => break,
                _ => continue,
            };
            let Ok(value) = serde_json::from_str::<Value>(&text) else {
                tracing::debug!(tab, "undecodable frame dropped");
                continue;
            };
            self.route_frame(tab, value).await;
        }

        // Only evict if a reconnect has not superseded this connection
        let detached = {
            let mut connections = self.connections.lock();
            match connections.get(&tab) {
                Some(conn) if conn.generation == generation => {
                    connections.remove(&tab);
                    true
                }
                _ => false,
            }
        };
        // Fail waiters still parked on this connection
        self.pending.lock().retain(|_, entry| entry.generation != generation);
        writer.abort();
        if detached {
            tracing::info!(tab, "executor detached");
            let _ = self.events_tx.send(PageEvent::ExecutorDetached { tab }).await;
        }
        Ok(())
    }

    async fn route_frame(&self, tab: TabId, value: Value) {
        // Response to one of our requests
        if let (Some(id), Some(response)) =
            (value.get("id").and_then(Value::as_u64), value.get("response"))
        {
            let waiter = self.pending.lock().remove(&id);
            match waiter {
                Some(entry) => {
                    let _ = entry.tx.send(response.clone());
                }
                // Settled request: the late response is discarded
                None => tracing::debug!(tab, id, "late executor response discarded"),
            }
            return;
        }

        // Page-originated supervisor command
        if let Some(command) = value.get("command") {
            let command_id = value.get("commandId").and_then(Value::as_u64);
            let request: Request = match serde_json::from_value(command.clone()) {
                Ok(request) => request,
                Err(err) => {
                    tracing::warn!(tab, error = %err, "invalid page command dropped");
                    self.answer_command(tab, command_id, Response::err("invalid command"));
                    return;
                }
            };
            let (reply_tx, reply_rx) = oneshot::channel();
            if self
                .events_tx
                .send(PageEvent::Command { tab, request, reply: reply_tx })
                .await
                .is_err()
            {
                return;
            }
            // Answer on the connection the command came in on
            let reply_conn = self.connections.lock().get(&tab).map(|c| c.tx.clone());
            tokio::spawn(async move {
                let response =
                    reply_rx.await.unwrap_or_else(|_| Response::err("supervisor dropped request"));
                let (Some(command_id), Some(tx)) = (command_id, reply_conn) else { return };
                let frame = json!({"commandId": command_id, "response": response});
                let _ = tx.send(Message::text(frame.to_string()));
            });
            return;
        }

        tracing::debug!(tab, "unroutable frame dropped");
    }

    fn answer_command(&self, tab: TabId, command_id: Option<u64>, response: Response) {
        let Some(command_id) = command_id else { return };
        let frame = json!({"commandId": command_id, "response": response});
        let connections = self.connections.lock();
        if let Some(conn) = connections.get(&tab) {
            let _ = conn.tx.send(Message::text(frame.to_string()));
        }
    }

    /// Connected tab ids, for diagnostics.
    pub fn connected_tabs(&self) -> Vec<TabId> {
        self.connections.lock().keys().copied().collect()
    }

    /// The page URL a tab's executor announced, if it is connected.
    pub fn tab_url(&self, tab: TabId) -> Option<String> {
        self.connections.lock().get(&tab).map(|c| c.url.clone())
    }
}

#[async_trait]
impl PageTransport for WsTransport {
    async fn send(&self, tab: TabId, request: ExecutorRequest) -> Result<Value, TransportError> {
        let (conn_tx, generation) = {
            let connections = self.connections.lock();
            let conn = connections.get(&tab).ok_or_else(|| {
                TransportError::NotAttached("receiving end does not exist".to_string())
            })?;
            (conn.tx.clone(), conn.generation)
        };

        let id = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, PendingEntry { generation, tx });
        let guard = PendingGuard { transport: self, id };

        let frame = json!({"id": id, "request": request});
        conn_tx.send(Message::text(frame.to_string())).map_err(|_| {
            TransportError::NotAttached("executor connection closing".to_string())
        })?;

        let result = rx.await.map_err(|_| TransportError::Closed);
        drop(guard);
        result
    }

    async fn notify(&self, tab: TabId, message: NotifyMessage) -> Result<(), TransportError> {
        let connections = self.connections.lock();
        let conn = connections
            .get(&tab)
            .ok_or_else(|| TransportError::NotAttached("receiving end does not exist".into()))?;
        let frame = json!({"notify": message});
        conn.tx
            .send(Message::text(frame.to_string()))
            .map_err(|_| TransportError::NotAttached("executor connection closing".into()))
    }

    async fn tab_exists(&self, tab: TabId) -> bool {
        self.connections.lock().contains_key(&tab)
    }
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
