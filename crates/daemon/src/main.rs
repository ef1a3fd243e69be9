// SPDX-License-Identifier: MIT

//! reeved: the Reeve supervisor daemon.

use fs2::FileExt;
use reeve_core::{ServerKey, SystemClock};
use reeve_daemon::manager::{InstanceManager, ManagerDeps};
use reeve_daemon::supervisor::Supervisor;
use reeve_daemon::ws::WsTransport;
use reeve_daemon::{env, listener};
use reeve_engine::NoopStrategy;
use reeve_storage::{migrate_legacy_layout, BotLogger, FileBackend, Storage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() {
    let config = env::DaemonConfig::load();
    let state_dir = config.state_dir();
    if let Err(err) = std::fs::create_dir_all(&state_dir) {
        eprintln!("cannot create state dir {}: {err}", state_dir.display());
        std::process::exit(1);
    }

    let _log_guard = init_tracing(&config);

    // Single daemon per state dir
    let lock_file = match std::fs::File::create(env::lock_path(&state_dir)) {
        Ok(file) => file,
        Err(err) => {
            tracing::error!(error = %err, "cannot create lock file");
            std::process::exit(1);
        }
    };
    if lock_file.try_lock_exclusive().is_err() {
        tracing::error!("another reeved already owns this state dir");
        std::process::exit(1);
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!(error = %err, "tokio runtime failed to start");
            std::process::exit(1);
        }
    };
    if let Err(err) = runtime.block_on(run(config, state_dir)) {
        tracing::error!(error = %err, "daemon failed");
        std::process::exit(1);
    }
}

fn init_tracing(config: &env::DaemonConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,reeve_daemon=debug"));

    let log_dir = config.log_dir();
    let file_layer = std::fs::create_dir_all(&log_dir).ok().map(|_| {
        let appender = tracing_appender::rolling::daily(&log_dir, "reeved.log");
        tracing_appender::non_blocking(appender)
    });

    match file_layer {
        Some((writer, guard)) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_target(false))
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_target(false))
                .init();
            None
        }
    }
}

async fn run(
    config: env::DaemonConfig,
    state_dir: std::path::PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let clock = SystemClock;
    let storage = Storage::new(FileBackend::new(&state_dir)?);

    // Legacy single-server layout migrates on first multi-server start
    let detected = std::env::var("REEVE_LEGACY_SERVER").ok().map(|s| ServerKey::new(&s));
    if let Some(server) = migrate_legacy_layout(&storage, detected, &clock).await? {
        tracing::info!(server = %server, "legacy records migrated");
    }

    let logger = BotLogger::new(storage.clone(), clock.clone());
    logger.load_history().await?;

    let shutdown = CancellationToken::new();
    let (events_tx, events_rx) = mpsc::channel(64);
    let transport = Arc::new(WsTransport::new(events_tx));

    let manager = Arc::new(InstanceManager::new(ManagerDeps {
        transport: transport.clone(),
        strategy: NoopStrategy,
        storage: storage.clone(),
        logger: logger.clone(),
        clock: clock.clone(),
    }));
    let supervisor = Supervisor::new(
        manager,
        transport.clone(),
        storage.clone(),
        logger.clone(),
        clock,
        shutdown.clone(),
    );
    supervisor.reconcile_persisted().await;

    // WebSocket bridge for page executors (loopback only)
    let ws_addr = format!("127.0.0.1:{}", config.ws_port());
    let ws_listener = tokio::net::TcpListener::bind(&ws_addr).await?;
    tracing::info!(addr = %ws_addr, "executor bridge listening");
    tokio::spawn(transport.clone().serve(ws_listener, shutdown.clone()));

    // Supervisor event and alarm pumps
    tokio::spawn(supervisor.clone().run_events(events_rx));
    tokio::spawn(supervisor.clone().run_alarms());

    // Periodic log flush
    {
        let logger = logger.clone();
        let cancel = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(reeve_storage::FLUSH_INTERVAL) => {}
                }
                if let Err(err) = logger.flush().await {
                    tracing::warn!(error = %err, "periodic log flush failed");
                }
            }
        });
    }

    // Operator socket, foreground until shutdown
    let socket = env::socket_path(&state_dir);
    let listener_task = {
        let supervisor = supervisor.clone();
        let cancel = shutdown.clone();
        let socket = socket.clone();
        tokio::spawn(async move { listener::serve(supervisor, &socket, cancel).await })
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    shutdown.cancel();
    supervisor.shutdown_all().await;
    let _ = listener_task.await;
    let _ = std::fs::remove_file(&socket);
    Ok(())
}
