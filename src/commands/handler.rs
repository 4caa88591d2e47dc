//! Command Handler Module
//!
//! This module implements the command surface of the server. It receives
//! decoded requests, validates them, runs them against the store and
//! returns the reply to write back.
//!
//! ## Supported Commands
//!
//! ### Data Commands
//! - `SET key value [EX|PX|EXAT|PXAT n]` - Set a key, optionally with expiry
//! - `GET key` - Get a key's value
//! - `EXIST key` (alias `EXISTS`) - Check if a key exists
//! - `DEL key [key ...]` - Delete keys
//! - `LPUSH key value [value ...]` - Push values to the head of a list
//! - `RPUSH key value [value ...]` - Push values to the tail of a list
//! - `INCR key` / `DECR key` - Add or subtract one from an integer
//!
//! ### Server Commands
//! - `SAVE` - Write a snapshot to disk
//! - `PING [message]` - Test connection
//! - `ECHO message` - Echo message
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │  execute()  │───>│  dispatch() │───>│   cmd_*()   │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │                                          │         │        │
//! │                                          ▼         ▼        │
//! │                                       Store  SnapshotManager│
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every `cmd_*` validates all of its arguments before touching the store,
//! so a rejected command never leaves a partial write behind.

use crate::commands::expiry::parse_expiry;
use crate::commands::CommandError;
use crate::persistence::SnapshotManager;
use crate::protocol::{Reply, Value};
use crate::storage::{ListEnd, Store};
use std::sync::Arc;
use tracing::{error, trace};

/// Result of a single command handler.
pub type CommandResult = Result<Reply, CommandError>;

/// Handles commands by dispatching them to the appropriate handlers.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    /// The shared store
    store: Arc<Store>,
    /// Snapshot target for SAVE
    snapshots: Arc<SnapshotManager>,
}

impl CommandHandler {
    /// Creates a new command handler over the given store.
    pub fn new(store: Arc<Store>, snapshots: Arc<SnapshotManager>) -> Self {
        Self { store, snapshots }
    }

    /// The store this handler operates on.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Executes a command and returns the reply.
    ///
    /// # Arguments
    ///
    /// * `command` - The decoded request (should be a non-empty array whose
    ///   first element is the command name)
    ///
    /// # Returns
    ///
    /// The reply to send back to the client. Failures become `-ERR ...`
    /// replies; nothing here closes the connection.
    pub async fn execute(&self, command: Value) -> Reply {
        match self.try_execute(command).await {
            Ok(reply) => reply,
            Err(e) => Reply::error(e.to_wire_message()),
        }
    }

    async fn try_execute(&self, command: Value) -> CommandResult {
        let args = match command {
            Value::List(args) if !args.is_empty() => args,
            _ => return Err(CommandError::InvalidCommand),
        };

        let cmd_name = args[0]
            .as_str()
            .ok_or(CommandError::InvalidCommandName)?
            .to_ascii_uppercase();

        trace!(command = %cmd_name, argc = args.len() - 1, "Executing command");

        self.dispatch(&cmd_name, &args[1..]).await
    }

    /// Dispatches a command to its handler.
    async fn dispatch(&self, cmd: &str, args: &[Value]) -> CommandResult {
        match cmd {
            "SET" => self.cmd_set(args),
            "GET" => self.cmd_get(args),
            "EXIST" => self.cmd_exist("EXIST", args),
            "EXISTS" => self.cmd_exist("EXISTS", args),
            "DEL" => self.cmd_del(args),
            "LPUSH" => self.cmd_push("LPUSH", args, ListEnd::Front),
            "RPUSH" => self.cmd_push("RPUSH", args, ListEnd::Back),
            "INCR" => self.cmd_incr("INCR", args, 1),
            "DECR" => self.cmd_incr("DECR", args, -1),
            "SAVE" => self.cmd_save(args).await,
            "PING" => self.cmd_ping(args),
            "ECHO" => self.cmd_echo(args),
            _ => Err(CommandError::UnknownCommand),
        }
    }

    // ========================================================================
    // Helper functions
    // ========================================================================

    /// Extracts a key, which must be a UTF-8 string.
    fn key<'a>(cmd: &'static str, value: &'a Value) -> Result<&'a str, CommandError> {
        value.as_str().ok_or(CommandError::InvalidArgument(cmd))
    }

    /// Extracts the single key of a one-key command.
    fn single_key<'a>(cmd: &'static str, args: &'a [Value]) -> Result<&'a str, CommandError> {
        let first = args.first().ok_or(CommandError::MissingArgument(cmd))?;
        Self::key(cmd, first)
    }

    // ========================================================================
    // Data Commands
    // ========================================================================

    /// SET key value [EX seconds | PX milliseconds | EXAT unix-s | PXAT unix-ms]
    fn cmd_set(&self, args: &[Value]) -> CommandResult {
        if args.len() < 2 {
            return Err(CommandError::WrongArgumentCount("SET"));
        }

        let key = Self::key("SET", &args[0])?;
        let expires_at = if args.len() > 2 {
            Some(parse_expiry(&args[2..])?)
        } else {
            None
        };

        self.store.set(key, args[1].clone(), expires_at);
        Ok(Reply::ok())
    }

    /// GET key
    fn cmd_get(&self, args: &[Value]) -> CommandResult {
        let key = Self::single_key("GET", args)?;

        match self.store.get(key) {
            Some(entry) => Ok(Reply::Data(entry.value)),
            None => Ok(Reply::null()),
        }
    }

    /// EXIST key
    fn cmd_exist(&self, cmd: &'static str, args: &[Value]) -> CommandResult {
        let key = Self::single_key(cmd, args)?;
        Ok(Reply::integer(i64::from(self.store.exists(key))))
    }

    /// DEL key [key ...]
    fn cmd_del(&self, args: &[Value]) -> CommandResult {
        if args.is_empty() {
            return Err(CommandError::MissingArgument("DEL"));
        }

        let keys = args
            .iter()
            .map(|arg| Self::key("DEL", arg))
            .collect::<Result<Vec<_>, _>>()?;

        let deleted = self.store.delete(&keys);
        Ok(Reply::integer(deleted as i64))
    }

    /// LPUSH/RPUSH key value [value ...]
    fn cmd_push(&self, cmd: &'static str, args: &[Value], end: ListEnd) -> CommandResult {
        if args.len() < 2 {
            return Err(CommandError::MissingArgument(cmd));
        }

        let key = Self::key(cmd, &args[0])?;
        self.store.push(key, args[1..].to_vec(), end)?;
        Ok(Reply::ok())
    }

    /// INCR/DECR key
    fn cmd_incr(&self, cmd: &'static str, args: &[Value], delta: i64) -> CommandResult {
        let key = Self::single_key(cmd, args)?;
        self.store.increment(key, delta)?;
        Ok(Reply::ok())
    }

    // ========================================================================
    // Server Commands
    // ========================================================================

    /// SAVE
    async fn cmd_save(&self, args: &[Value]) -> CommandResult {
        if !args.is_empty() {
            return Err(CommandError::WrongArgumentCount("SAVE"));
        }

        match self.snapshots.save(&self.store).await {
            Ok(_) => Ok(Reply::ok()),
            Err(e) => {
                error!(error = %e, path = %self.snapshots.path().display(), "SAVE failed");
                Err(CommandError::SaveFailed)
            }
        }
    }

    /// PING [message]
    fn cmd_ping(&self, args: &[Value]) -> CommandResult {
        match args {
            [] => Ok(Reply::pong()),
            [message] => Ok(Reply::Data(message.clone())),
            _ => Err(CommandError::WrongArgumentCount("PING")),
        }
    }

    /// ECHO message
    fn cmd_echo(&self, args: &[Value]) -> CommandResult {
        let message = args.first().ok_or(CommandError::MissingArgument("ECHO"))?;
        match message {
            Value::String(_) => Ok(Reply::Data(message.clone())),
            _ => Err(CommandError::InvalidArgument("ECHO")),
        }
    }
}
