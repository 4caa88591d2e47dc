//! # redlite - A Small In-Memory Key-Value Server
//!
//! redlite is a single-node, in-memory key-value store that speaks a
//! RESP-style wire protocol. Values are strings, integers, lists or null;
//! keys may carry an absolute expiry; the whole store can be snapshotted to
//! a JSON file on demand.
//!
//! ## Features
//!
//! - **RESP-style protocol**: five line-terminated value forms, pipelining
//! - **Typed values**: strings, integers and heterogeneous lists
//! - **Expiry**: `EX`, `PX`, `EXAT` and `PXAT` with lazy and active cleanup
//! - **Snapshots**: `SAVE` writes the store to JSON, loaded again at startup
//! - **Async I/O**: Built on Tokio, one task per connection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              redlite                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │                  │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │                                               │                         │
//! │                                               ▼                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐   │
//! │  │   RESP      │    │                   Store                      │   │
//! │  │   Parser    │    │        RwLock<HashMap<String, Entry>>        │   │
//! │  └─────────────┘    └──────────────────────────────────────────────┘   │
//! │                              ▲                        ▲                 │
//! │                              │                        │                 │
//! │               ┌──────────────┴──────────┐   ┌─────────┴─────────┐      │
//! │               │      ExpiryReaper       │   │  SnapshotManager  │      │
//! │               │ (Background Tokio Task) │   │   (SAVE / load)   │      │
//! │               └─────────────────────────┘   └───────────────────┘      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use redlite::commands::CommandHandler;
//! use redlite::connection::ConnectionStats;
//! use redlite::persistence::SnapshotManager;
//! use redlite::server::Server;
//! use redlite::storage::{start_expiry_reaper, Store};
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(Store::new());
//!     let snapshots = Arc::new(SnapshotManager::new("data.json"));
//!     snapshots.load(&store)?;
//!
//!     let reaper = start_expiry_reaper(Arc::clone(&store), Duration::from_secs(1));
//!
//!     let listener = TcpListener::bind("127.0.0.1:6379").await?;
//!     let handler = CommandHandler::new(Arc::clone(&store), snapshots);
//!     let server = Server::new(listener, handler, Arc::new(ConnectionStats::new()));
//!
//!     server.run(async { let _ = tokio::signal::ctrl_c().await; }).await;
//!     reaper.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `SET key value [EX|PX|EXAT|PXAT n]`
//! - `GET key`
//! - `EXIST key` (also `EXISTS`)
//! - `DEL key [key ...]`
//! - `LPUSH key value [value ...]` / `RPUSH key value [value ...]`
//! - `INCR key` / `DECR key`
//! - `SAVE`
//! - `PING [message]` / `ECHO message`
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP value model, encoder and decoder
//! - [`storage`]: The store, Unix clock helpers and the expiry reaper
//! - [`persistence`]: JSON snapshots
//! - [`commands`]: Command dispatch and client-facing errors
//! - [`connection`]: Per-client connection loop
//! - [`server`]: Accept loop and graceful shutdown
//! - [`config`]: Command-line / environment configuration
//!
//! ## Design Highlights
//!
//! ### One Lock, Atomic Commands
//!
//! The store is a single `RwLock<HashMap>`. Every command runs inside one
//! critical section, so commands never interleave with each other.
//!
//! ### Lazy + Active Expiry
//!
//! Keys with an expiry are removed in two ways:
//! 1. **Lazy**: reads treat a lapsed key as absent and GET deletes it
//! 2. **Active**: a background task periodically sweeps lapsed keys
//!
//! This ensures memory is reclaimed even for keys that are never read again.

pub mod commands;
pub mod config;
pub mod connection;
pub mod persistence;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::{CommandError, CommandHandler};
pub use config::Config;
pub use connection::{handle_connection, ConnectionStats};
pub use persistence::{SnapshotError, SnapshotManager, DEFAULT_SNAPSHOT_PATH};
pub use protocol::{ParseError, Reply, RespParser, Value};
pub use server::Server;
pub use storage::{start_expiry_reaper, ExpiryReaper, ReaperConfig, Store};

/// The default port redlite listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host redlite binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of redlite
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
