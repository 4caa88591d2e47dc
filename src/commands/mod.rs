//! Command Handler Module
//!
//! This module implements the command processing layer. It receives decoded
//! requests, executes them against the store, and returns the reply.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  RESP Parser    │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Dispatch     │
//! │  - Validate     │
//! │  - Execute      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │     Store       │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `SET`, `GET`, `EXIST`/`EXISTS`, `DEL`
//! - `LPUSH`, `RPUSH`
//! - `INCR`, `DECR`
//! - `SAVE`, `PING`, `ECHO`

pub mod error;
pub mod expiry;
pub mod handler;

pub use error::CommandError;
pub use handler::{CommandHandler, CommandResult};
