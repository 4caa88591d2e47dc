//! TCP accept loop with graceful shutdown.
//!
//! One task is spawned per accepted connection, with no connection limit.
//! When the shutdown future resolves the listener stops accepting, every
//! connection is told to finish what it has buffered, and `run` returns once
//! all of them have exited.

use crate::commands::CommandHandler;
use crate::connection::{handle_connection, ConnectionStats};
use crate::protocol::RespParser;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// A bound listener plus everything a connection needs.
pub struct Server {
    listener: TcpListener,
    command_handler: CommandHandler,
    parser: RespParser,
    stats: Arc<ConnectionStats>,
}

impl Server {
    /// Creates a server over an already-bound listener.
    pub fn new(
        listener: TcpListener,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        Self {
            listener,
            command_handler,
            parser: RespParser::new(),
            stats,
        }
    }

    /// Uses `parser` as the prototype for every connection's decoder.
    pub fn with_parser(mut self, parser: RespParser) -> Self {
        self.parser = parser;
        self
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until `shutdown` resolves, then drains them.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut connections = JoinSet::new();

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = self.listener.accept() => match result {
                    Ok((stream, addr)) => {
                        connections.spawn(handle_connection(
                            stream,
                            addr,
                            self.command_handler.clone(),
                            self.parser.clone(),
                            Arc::clone(&self.stats),
                            shutdown_rx.clone(),
                        ));
                    }
                    Err(e) => error!(error = %e, "Failed to accept connection"),
                },
                Some(result) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = result {
                        warn!(error = %e, "Connection task failed");
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutdown signal received, stopping server...");
                    break;
                }
            }
        }

        drop(self.listener);

        let _ = shutdown_tx.send(true);
        info!(connections = connections.len(), "Draining open connections");

        while let Some(result) = connections.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "Connection task failed");
            }
        }

        debug!("All connections closed");
    }
}
