//! Storage Module
//!
//! This module provides the in-memory store, its Unix clock helpers and the
//! background expiry reaper.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Store                              │
//! │        RwLock<HashMap<String, Entry { value, expires_at }>> │
//! └─────────────────────────────────────────────────────────────┘
//!        ▲                      ▲                      ▲
//!        │                      │                      │
//!  CommandHandler         ExpiryReaper          SnapshotManager
//!  (per connection)   (Background Tokio Task)    (SAVE / startup)
//! ```
//!
//! ## Features
//!
//! - **Single RwLock**: concurrent readers, exclusive writers, every command atomic
//! - **Absolute expiry**: entries carry a Unix-second deadline
//! - **Lazy Expiry**: lapsed keys read as absent and GET removes them
//! - **Active Expiry**: the reaper removes lapsed keys nobody reads
//!
//! ## Example
//!
//! ```
//! use redlite::protocol::Value;
//! use redlite::storage::{clock, ListEnd, Store};
//!
//! let store = Store::new();
//!
//! store.set("name", Value::string("Ada"), None);
//! assert!(store.exists("name"));
//!
//! // Expires one hour from now
//! store.set("session", Value::string("token123"), Some(clock::now_secs() + 3600));
//!
//! store.push("queue", vec![Value::from("job")], ListEnd::Back).unwrap();
//! ```

pub mod clock;
pub mod engine;
pub mod expiry;

// Re-export commonly used types
pub use engine::{Entry, ListEnd, StorageStats, Store, StoreError};
pub use expiry::{start_expiry_reaper, ExpiryReaper, ReaperConfig, DEFAULT_REAPER_INTERVAL};
