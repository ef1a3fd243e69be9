// SPDX-License-Identifier: MIT

//! Operator socket listener.
//!
//! Newline-delimited JSON over a unix socket: one [`Request`] per line,
//! one [`Response`] per line back. Connections are handled in spawned
//! tasks so a slow client never blocks the supervisor.

use crate::protocol::{Request, Response};
use crate::supervisor::{RequestOrigin, Supervisor};
use reeve_core::Clock;
use reeve_engine::{PageTransport, Strategy};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

pub async fn serve<T, S, C>(
    supervisor: Arc<Supervisor<T, S, C>>,
    socket_path: &Path,
    cancel: CancellationToken,
) -> std::io::Result<()>
where
    T: PageTransport,
    S: Strategy + Clone,
    C: Clock + 'static,
{
    // A dead socket file from a previous run blocks the bind
    if socket_path.exists() {
        let _ = std::fs::remove_file(socket_path);
    }
    let listener = UnixListener::bind(socket_path)?;
    tracing::info!(path = %socket_path.display(), "operator socket listening");

    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, _)) => {
                let supervisor = supervisor.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_client(supervisor, stream).await {
                        tracing::debug!(error = %err, "client connection ended");
                    }
                });
            }
            Err(err) => tracing::warn!(error = %err, "accept failed"),
        }
    }
}

async fn handle_client<T, S, C>(
    supervisor: Arc<Supervisor<T, S, C>>,
    stream: UnixStream,
) -> std::io::Result<()>
where
    T: PageTransport,
    S: Strategy + Clone,
    C: Clock + 'static,
{
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => supervisor.handle_request(request, RequestOrigin::Operator).await,
            Err(err) => Response::err(format!("invalid request: {err}")),
        };
        let mut payload = serde_json::to_string(&response)
            .unwrap_or_else(|_| r#"{"success":false,"error":"unserializable response"}"#.into());
        payload.push('\n');
        write_half.write_all(payload.as_bytes()).await?;
    }
    Ok(())
}
