//! SET expiry clause parsing.
//!
//! `SET key value <OPTION> <n>` where OPTION is one of:
//!
//! | Option | `n` is                 | Stored expiry            |
//! |--------|------------------------|--------------------------|
//! | `EX`   | seconds from now       | now + n                  |
//! | `PX`   | milliseconds from now  | (now_ms + n) / 1000      |
//! | `EXAT` | Unix seconds (> 0)     | n                        |
//! | `PXAT` | Unix milliseconds (> 0)| max(n / 1000, 1)         |
//!
//! Everything resolves to whole Unix seconds.

use crate::commands::CommandError;
use crate::protocol::Value;
use crate::storage::clock::{self, UnixSeconds};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExpiryOption {
    Ex,
    Px,
    ExAt,
    PxAt,
}

impl ExpiryOption {
    fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "EX" => Some(Self::Ex),
            "PX" => Some(Self::Px),
            "EXAT" => Some(Self::ExAt),
            "PXAT" => Some(Self::PxAt),
            _ => None,
        }
    }
}

/// Resolves an expiry clause to an absolute Unix second, relative to now.
pub fn parse_expiry(clause: &[Value]) -> Result<UnixSeconds, CommandError> {
    resolve_expiry(clause, clock::now_millis())
}

/// Resolves an expiry clause against the given current time in Unix
/// milliseconds.
///
/// Checks run in a fixed order: clause length, option type, value, then the
/// option name itself.
pub fn resolve_expiry(clause: &[Value], now_ms: i64) -> Result<UnixSeconds, CommandError> {
    let [option, amount] = clause else {
        return Err(CommandError::InvalidExpiryArguments);
    };

    let name = match option {
        Value::String(_) => option.as_str().ok_or(CommandError::InvalidExpiryOptionType)?,
        _ => return Err(CommandError::InvalidExpiryOptionType),
    };

    let amount = expiry_amount(amount).ok_or(CommandError::InvalidExpiryValue)?;
    let option = ExpiryOption::parse(name).ok_or(CommandError::UnsupportedExpiryOption)?;

    match option {
        ExpiryOption::Ex => {
            if amount < 0 {
                return Err(CommandError::InvalidExpiryValue);
            }
            clock::millis_to_secs(now_ms)
                .checked_add(amount)
                .ok_or(CommandError::InvalidExpiryValue)
        }
        ExpiryOption::Px => {
            if amount < 0 {
                return Err(CommandError::InvalidExpiryValue);
            }
            now_ms
                .checked_add(amount)
                .map(clock::millis_to_secs)
                .ok_or(CommandError::InvalidExpiryValue)
        }
        ExpiryOption::ExAt => {
            if amount <= 0 {
                return Err(CommandError::InvalidUnixTime("EXAT"));
            }
            Ok(amount)
        }
        ExpiryOption::PxAt => {
            if amount <= 0 {
                return Err(CommandError::InvalidUnixTime("PXAT"));
            }
            // 0 means "no expiry" in snapshots, so a sub-second time
            // rounds up to the first second
            Ok(clock::millis_to_secs(amount).max(1))
        }
    }
}

/// Accepts an integer element or a decimal string.
fn expiry_amount(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(n) => Some(*n),
        Value::String(_) => value.as_str()?.parse().ok(),
        _ => None,
    }
}
