//! Unix wall-clock helpers.
//!
//! Expiry is absolute (it survives a snapshot round trip), so it is measured
//! against the Unix epoch rather than `Instant`.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// An absolute point in time, in whole seconds since the Unix epoch.
pub type UnixSeconds = i64;

fn since_epoch() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
}

/// Current Unix time in seconds.
pub fn now_secs() -> UnixSeconds {
    since_epoch().as_secs() as i64
}

/// Current Unix time in milliseconds.
pub fn now_millis() -> i64 {
    since_epoch().as_millis() as i64
}

/// Converts Unix milliseconds to Unix seconds, rounding down.
pub fn millis_to_secs(ms: i64) -> UnixSeconds {
    ms.div_euclid(1000)
}
