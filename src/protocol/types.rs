//! Wire Value Model and Encoder
//!
//! This module defines the single value shape shared by the codec, the store
//! and the snapshot format, plus the reply type the command layer hands back
//! to a connection.
//!
//! ## Protocol Format
//!
//! Each wire form starts with a type prefix byte and ends with CRLF:
//! - `+` Simple String (status replies)
//! - `-` Error
//! - `:` Integer
//! - `$` Bulk String (`$-1` is null)
//! - `*` Array (`*-1` is null)
//!
//! ## Examples
//!
//! Status: `+OK\r\n`
//! Error: `-ERR unknown command\r\n`
//! Integer: `:1000\r\n`
//! Bulk String: `$5\r\nhello\r\n`
//! Array: `*2\r\n$3\r\nGET\r\n$4\r\nname\r\n`
//! Null: `$-1\r\n`
//!
//! ## Lossy forms
//!
//! An empty string and `Null` both encode as `$-1\r\n`, so decoding an encoded
//! empty string yields `Null`. Clients that must tell "empty" from "absent"
//! cannot rely on the wire form.

use bytes::Bytes;
use std::fmt;

/// The CRLF terminator used by every wire form
pub const CRLF: &[u8] = b"\r\n";

/// Type prefixes of the five wire forms
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// Error line written when a value has no wire representation in the
/// requested mode.
const UNSUPPORTED: &[u8] = b"-ERR unsupported RESP type\r\n";

/// A value as decoded from the wire, stored in the store and written to
/// snapshots.
///
/// Lists are heterogeneous: every element is itself a `Value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Binary-safe string payload.
    String(Bytes),

    /// 64-bit signed integer.
    Integer(i64),

    /// Ordered sequence of values.
    List(Vec<Value>),

    /// Absent value (`$-1` / `*-1`).
    Null,
}

/// Selects how a `Value::String` is written.
///
/// Commands whose reply is a status (`+OK`) use `Status`; commands returning
/// stored data use `Data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Simple-string line: `+<payload>\r\n`
    Status,
    /// Length-prefixed bulk string: `$<len>\r\n<payload>\r\n`
    Data,
}

impl Value {
    /// Creates a string value.
    ///
    /// # Example
    /// ```
    /// use redlite::protocol::types::Value;
    /// let v = Value::string("hello");
    /// assert_eq!(v.as_str(), Some("hello"));
    /// ```
    pub fn string(data: impl Into<Bytes>) -> Self {
        Value::String(data.into())
    }

    /// Creates a list value.
    pub fn list(values: Vec<Value>) -> Self {
        Value::List(values)
    }

    /// Encodes the value to bytes using the given mode.
    pub fn encode(&self, mode: Encoding) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_into(mode, &mut buf);
        buf
    }

    /// Encodes the value into an existing buffer.
    ///
    /// List elements are always written in `Data` mode.
    pub fn encode_into(&self, mode: Encoding, buf: &mut Vec<u8>) {
        match self {
            Value::String(data) => match mode {
                Encoding::Status => {
                    if data.iter().any(|&b| b == b'\r' || b == b'\n') {
                        buf.extend_from_slice(UNSUPPORTED);
                        return;
                    }
                    buf.push(prefix::SIMPLE_STRING);
                    buf.extend_from_slice(data);
                    buf.extend_from_slice(CRLF);
                }
                Encoding::Data if data.is_empty() => encode_null(buf),
                Encoding::Data => {
                    buf.push(prefix::BULK_STRING);
                    buf.extend_from_slice(data.len().to_string().as_bytes());
                    buf.extend_from_slice(CRLF);
                    buf.extend_from_slice(data);
                    buf.extend_from_slice(CRLF);
                }
            },
            Value::Integer(n) => {
                buf.push(prefix::INTEGER);
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Value::List(values) => {
                buf.push(prefix::ARRAY);
                buf.extend_from_slice(values.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                for value in values {
                    value.encode_into(Encoding::Data, buf);
                }
            }
            Value::Null => encode_null(buf),
        }
    }

    /// Returns true if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the payload as UTF-8 text, if this is a valid UTF-8 string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Attempts to extract the inner integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Attempts to extract the inner list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(values) => Some(values),
            _ => None,
        }
    }

    /// Short name of the variant, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Integer(_) => "integer",
            Value::List(_) => "list",
            Value::Null => "null",
        }
    }
}

fn encode_null(buf: &mut Vec<u8>) {
    buf.push(prefix::BULK_STRING);
    buf.extend_from_slice(b"-1");
    buf.extend_from_slice(CRLF);
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(data) => {
                if let Ok(s) = std::str::from_utf8(data) {
                    write!(f, "\"{}\"", s)
                } else {
                    write!(f, "(binary data, {} bytes)", data.len())
                }
            }
            Value::Integer(n) => write!(f, "(integer) {}", n),
            Value::Null => write!(f, "(nil)"),
            Value::List(values) => {
                if values.is_empty() {
                    write!(f, "(empty list)")
                } else {
                    write!(f, "[")?;
                    for (i, v) in values.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", v)?;
                    }
                    write!(f, "]")
                }
            }
        }
    }
}

/// A reply produced by the command layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Status line such as `+OK`.
    Status(String),
    /// Error line; the message is written verbatim after `-`.
    Error(String),
    /// Stored data, written in `Data` mode.
    Data(Value),
}

impl Reply {
    /// `+OK`
    pub fn ok() -> Self {
        Reply::Status("OK".to_string())
    }

    /// `+PONG`
    pub fn pong() -> Self {
        Reply::Status("PONG".to_string())
    }

    /// Creates an error reply.
    ///
    /// # Example
    /// ```
    /// use redlite::protocol::types::Reply;
    /// let err = Reply::error("ERR unknown command");
    /// assert_eq!(err.serialize(), b"-ERR unknown command\r\n");
    /// ```
    pub fn error(msg: impl Into<String>) -> Self {
        Reply::Error(msg.into())
    }

    /// Creates an integer data reply.
    pub fn integer(n: i64) -> Self {
        Reply::Data(Value::Integer(n))
    }

    /// `$-1`
    pub fn null() -> Self {
        Reply::Data(Value::Null)
    }

    /// Returns true if this reply is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// Serializes the reply to wire bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the reply into an existing buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            Reply::Status(s) => {
                Value::String(Bytes::copy_from_slice(s.as_bytes()))
                    .encode_into(Encoding::Status, buf);
            }
            Reply::Error(msg) => {
                buf.push(prefix::ERROR);
                buf.extend(msg.bytes().filter(|&b| b != b'\r' && b != b'\n'));
                buf.extend_from_slice(CRLF);
            }
            Reply::Data(value) => value.encode_into(Encoding::Data, buf),
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Status(s) => write!(f, "{}", s),
            Reply::Error(s) => write!(f, "(error) {}", s),
            Reply::Data(v) => write!(f, "{}", v),
        }
    }
}
