//! Client-facing command errors.
//!
//! The `Display` text of each variant is exactly what the client sees after
//! the `-ERR ` prefix, so the wording is part of the protocol.

use crate::storage::StoreError;
use thiserror::Error;

/// Everything a command can report back to a client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The request was not a non-empty array.
    #[error("invalid command")]
    InvalidCommand,

    /// The first element of the request was not a string.
    #[error("invalid command name")]
    InvalidCommandName,

    #[error("unknown command")]
    UnknownCommand,

    #[error("missing argument for {0}")]
    MissingArgument(&'static str),

    #[error("wrong number of arguments for {0}")]
    WrongArgumentCount(&'static str),

    /// A key (or ECHO message) was not a UTF-8 string.
    #[error("invalid argument for {0}")]
    InvalidArgument(&'static str),

    #[error("invalid expiry arguments")]
    InvalidExpiryArguments,

    #[error("invalid expiry option type")]
    InvalidExpiryOptionType,

    #[error("invalid expiry value")]
    InvalidExpiryValue,

    #[error("invalid Unix time for {0}")]
    InvalidUnixTime(&'static str),

    #[error("unsupported expiry option")]
    UnsupportedExpiryOption,

    #[error("error saving data")]
    SaveFailed,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CommandError {
    /// The full error line payload, as written after `-`.
    pub fn to_wire_message(&self) -> String {
        format!("ERR {}", self)
    }
}
