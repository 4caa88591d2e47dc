//! Wire Protocol Codec
//!
//! A RESP-style protocol with five line-terminated forms: simple strings,
//! errors, integers, bulk strings and arrays.
//!
//! ## Modules
//!
//! - `types`: the `Value` model, `Reply`, and the encoder
//! - `parser`: the incremental decoder
//!
//! ## Example
//!
//! ```
//! use redlite::protocol::{decode, Encoding, Reply, Value};
//!
//! // Decoding incoming data
//! let data = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
//! let (value, consumed) = decode(data).unwrap();
//! assert_eq!(consumed, data.len());
//!
//! // Encoding replies
//! assert_eq!(Value::string("hello").encode(Encoding::Data), b"$5\r\nhello\r\n");
//! assert_eq!(Reply::ok().serialize(), b"+OK\r\n");
//! ```

pub mod parser;
pub mod types;

pub use parser::{decode, decode_with, ParseError, ParseResult, RespParser};
pub use types::{Encoding, Reply, Value};
