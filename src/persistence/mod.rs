//! Snapshot Persistence
//!
//! The store is persisted only on demand (the SAVE command) and restored once
//! at startup, before the listener accepts any client.

pub mod snapshot;

pub use snapshot::{SnapshotError, SnapshotManager, DEFAULT_SNAPSHOT_PATH};
