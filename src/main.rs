//! redlite - A Small In-Memory Key-Value Server
//!
//! This is the main entry point for the server. It loads the snapshot, starts
//! the expiry reaper, binds the listener and serves clients until Ctrl+C.

use anyhow::Context;
use clap::Parser;
use redlite::commands::CommandHandler;
use redlite::connection::ConnectionStats;
use redlite::persistence::SnapshotManager;
use redlite::server::Server;
use redlite::storage::{start_expiry_reaper, Store};
use redlite::Config;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

fn print_banner(config: &Config) {
    println!(
        r#"
redlite v{} - In-Memory Key-Value Server
──────────────────────────────────────────────────────────────
Listening on {}
Snapshot file {}

Use Ctrl+C to shutdown gracefully.
"#,
        redlite::VERSION,
        config.bind_address(),
        config.snapshot.display()
    );
}

/// Resolves on Ctrl+C. If the handler cannot be installed the server keeps
/// running rather than exiting at once.
async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}

fn log_final_stats(store: &Store, connections: &ConnectionStats) {
    let storage = store.stats();
    info!(
        keys = storage.keys,
        gets = storage.get_ops,
        sets = storage.set_ops,
        deletes = storage.del_ops,
        expired = storage.expired,
        "Final store statistics"
    );
    info!(
        accepted = connections.connections_accepted.load(Ordering::Relaxed),
        commands = connections.commands_processed.load(Ordering::Relaxed),
        protocol_errors = connections.protocol_errors.load(Ordering::Relaxed),
        bytes_in = connections.bytes_read.load(Ordering::Relaxed),
        bytes_out = connections.bytes_written.load(Ordering::Relaxed),
        "Final connection statistics"
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(&config);

    // The store is shared by every connection, the reaper and SAVE
    let store = Arc::new(Store::new());
    let snapshots = Arc::new(SnapshotManager::new(&config.snapshot));

    // A corrupt snapshot is fatal: serving a partial store would be wrong
    snapshots
        .load(&store)
        .with_context(|| format!("failed to load snapshot {}", config.snapshot.display()))?;

    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;
    info!(address = %config.bind_address(), "Listening");

    let reaper = start_expiry_reaper(Arc::clone(&store), config.reaper_interval());

    let stats = Arc::new(ConnectionStats::new());
    let handler = CommandHandler::new(Arc::clone(&store), snapshots);
    let server = Server::new(listener, handler, Arc::clone(&stats)).with_parser(config.parser());

    print_banner(&config);

    server.run(shutdown_signal()).await;
    reaper.shutdown().await;

    log_final_stats(&store, &stats);
    info!("Server shutdown complete");
    Ok(())
}
