// SPDX-License-Identifier: MIT

//! Socket client for the daemon's operator protocol.

use anyhow::{bail, Context, Result};
use reeve_daemon::{Request, Response};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

pub struct Client {
    socket: PathBuf,
}

impl Client {
    pub fn new(socket: Option<PathBuf>) -> Self {
        let socket = socket.unwrap_or_else(default_socket);
        Self { socket }
    }

    /// Send one request and wait for its response.
    pub async fn call(&self, request: Request) -> Result<Response> {
        let stream = UnixStream::connect(&self.socket).await.with_context(|| {
            format!(
                "cannot reach reeved at {} (is the daemon running?)",
                self.socket.display()
            )
        })?;
        let (read_half, mut write_half) = stream.into_split();

        let mut payload = serde_json::to_string(&request)?;
        payload.push('\n');
        write_half.write_all(payload.as_bytes()).await?;

        let mut line = String::new();
        BufReader::new(read_half).read_line(&mut line).await?;
        if line.trim().is_empty() {
            bail!("daemon closed the connection without answering");
        }
        Ok(serde_json::from_str(&line)?)
    }

    /// Like `call`, but turns a failed response into an error.
    pub async fn expect_ok(&self, request: Request) -> Result<Option<serde_json::Value>> {
        let response = self.call(request).await?;
        if !response.success {
            bail!("{}", response.error.unwrap_or_else(|| "daemon refused".into()));
        }
        Ok(response.data)
    }
}

fn default_socket() -> PathBuf {
    let config = reeve_daemon::env::DaemonConfig::load();
    reeve_daemon::env::socket_path(&config.state_dir())
}

/// Socket path override from the environment, for scripting.
pub fn socket_from_env() -> Option<PathBuf> {
    std::env::var_os("REEVE_SOCKET").map(PathBuf::from).filter(|p| Path::new(p).is_absolute())
}
