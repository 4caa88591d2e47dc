//! Configuration Module
//!
//! Server configuration from command-line flags, each of which can also be
//! set through an environment variable.

use crate::persistence::DEFAULT_SNAPSHOT_PATH;
use crate::protocol::RespParser;
use crate::{DEFAULT_HOST, DEFAULT_PORT};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration parameters.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "redlite",
    version,
    about = "A small in-memory key-value server speaking a RESP-style protocol"
)]
pub struct Config {
    /// Host to bind to
    #[arg(long, env = "REDLITE_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "REDLITE_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Snapshot file read at startup and written by SAVE
    #[arg(long, env = "REDLITE_SNAPSHOT", value_name = "FILE", default_value = DEFAULT_SNAPSHOT_PATH)]
    pub snapshot: PathBuf,

    /// Milliseconds between expiry sweeps
    #[arg(
        long,
        env = "REDLITE_REAPER_INTERVAL_MS",
        default_value_t = 1000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub reaper_interval_ms: u64,

    /// Store bulk strings that are canonical decimal integers as integers
    #[arg(long, env = "REDLITE_INFER_INTEGERS")]
    pub infer_integers: bool,

    /// Log filter used when RUST_LOG is not set (e.g. "info", "redlite=debug")
    #[arg(long, env = "REDLITE_LOG", default_value = "info")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            snapshot: PathBuf::from(DEFAULT_SNAPSHOT_PATH),
            reaper_interval_ms: 1000,
            infer_integers: false,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Interval between expiry sweeps
    pub fn reaper_interval(&self) -> Duration {
        Duration::from_millis(self.reaper_interval_ms)
    }

    /// A parser prototype carrying the integer-inference setting
    pub fn parser(&self) -> RespParser {
        RespParser::with_integer_inference(self.infer_integers)
    }
}
