// SPDX-License-Identifier: MIT

//! reeve: operator CLI for the Reeve daemon.

mod client;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use client::Client;
use reeve_core::{ServerKey, TaskKind};
use reeve_daemon::Request;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "reeve", about = "Drive the Reeve automation daemon", version)]
struct Cli {
    /// Print raw JSON responses
    #[arg(long, global = true)]
    json: bool,

    /// Operator socket path (default: the daemon's state dir)
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List known servers
    Servers,
    /// Show one instance's status
    Status { server: String },
    /// Start the bot for a server
    Start { server: String },
    /// Stop the bot for a server
    Stop { server: String },
    /// Pause a running bot
    Pause { server: String },
    /// Resume a paused bot
    Resume { server: String },
    /// Emergency-stop a bot
    Emergency {
        server: String,
        /// Recorded stop reason
        #[arg(long)]
        reason: Option<String>,
    },
    /// Show the log stream
    Logs {
        /// Only entries for this server
        server: Option<String>,
    },
    /// Show a server's task queue
    Queue { server: String },
    /// Enqueue a task
    AddTask {
        server: String,
        /// Task kind (e.g. upgrade_resource, send_farm)
        kind: String,
        /// JSON params for the task
        #[arg(long, default_value = "{}")]
        params: String,
        #[arg(long, default_value_t = 5)]
        priority: u8,
        #[arg(long)]
        village: Option<String>,
    },
    /// Remove one task by id
    RemoveTask { server: String, id: u64 },
    /// Clear a server's queue
    ClearQueue { server: String },
    /// Save a config record from a JSON file (or stdin with "-")
    SaveConfig { server: String, file: PathBuf },
    /// Run a full dorf1+dorf2 scan now
    Scan { server: String },
    /// Show the active strategy
    Strategy { server: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    let socket = cli.socket.or_else(client::socket_from_env);
    let client = Client::new(socket);

    let request = match cli.command {
        Command::Servers => Request::GetServers,
        Command::Status { server } => Request::GetStatus { server: Some(key(&server)) },
        Command::Start { server } => Request::StartBot { server: key(&server) },
        Command::Stop { server } => Request::StopBot { server: key(&server) },
        Command::Pause { server } => Request::PauseBot { server: key(&server), pause: true },
        Command::Resume { server } => Request::PauseBot { server: key(&server), pause: false },
        Command::Emergency { server, reason } => {
            Request::EmergencyStop { server: key(&server), reason }
        }
        Command::Logs { server } => Request::GetLogs { server: server.as_deref().map(key) },
        Command::Queue { server } => Request::GetQueue { server: key(&server) },
        Command::AddTask { server, kind, params, priority, village } => {
            let kind: TaskKind = serde_json::from_value(serde_json::Value::String(kind))
                .map_err(|_| anyhow::anyhow!("unknown task kind"))?;
            Request::AddTask {
                server: key(&server),
                kind,
                params: serde_json::from_str(&params)?,
                priority,
                village_id: village,
            }
        }
        Command::RemoveTask { server, id } => Request::RemoveTask { server: key(&server), id },
        Command::ClearQueue { server } => Request::ClearQueue { server: key(&server) },
        Command::SaveConfig { server, file } => {
            let raw = if file.as_os_str() == "-" {
                std::io::read_to_string(std::io::stdin())?
            } else {
                std::fs::read_to_string(&file)?
            };
            Request::SaveConfig { server: key(&server), config: serde_json::from_str(&raw)? }
        }
        Command::Scan { server } => Request::RequestScan { server: key(&server) },
        Command::Strategy { server } => Request::GetStrategy { server: key(&server) },
    };

    let data = client.expect_ok(request).await?;
    output::render(data.as_ref(), cli.json);
    Ok(())
}

fn key(s: &str) -> ServerKey {
    // Accept either a bare key or a full game URL
    if s.contains("://") {
        ServerKey::from_url(s)
    } else {
        ServerKey::new(&s.to_ascii_lowercase())
    }
}
