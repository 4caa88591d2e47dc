//! Incremental Wire Decoder
//!
//! Decodes exactly one top-level value from the front of a buffer and reports
//! how many bytes it used. Anything after that value is left for the caller.
//!
//! ## How the Parser Works
//!
//! [`RespParser::parse`] returns either:
//! - `Ok(Some((value, consumed)))` - a complete value, `consumed` bytes were used
//! - `Ok(None)` - the value is incomplete, more bytes are needed
//! - `Err(ParseError)` - the bytes are not valid wire data
//!
//! [`decode`] is the one-shot form: an incomplete value is an error there.
//!
//! Decoding never mutates caller state. On error nothing is returned, so a
//! caller's buffer and store stay exactly as they were.
//!
//! ## Integer inference
//!
//! By default a bulk string always decodes as `Value::String`, even when its
//! payload looks numeric. With [`RespParser::with_integer_inference`] a bulk
//! string whose payload is the canonical decimal form of an `i64` decodes as
//! `Value::Integer` instead. `"1234"` becomes `1234`; `"+1234"` and `"01234"`
//! stay strings.

use crate::protocol::types::{prefix, Value, CRLF};
use bytes::Bytes;
use std::num::ParseIntError;
use thiserror::Error;

/// Errors that can occur while decoding.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// The input buffer is empty
    #[error("empty input")]
    EmptyInput,

    /// The value is truncated
    #[error("incomplete value: more bytes required")]
    Incomplete,

    /// Unknown type prefix byte
    #[error("unknown type prefix: {0:#04x}")]
    UnknownPrefix(u8),

    /// Invalid integer or length line
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Length or count line that is not UTF-8
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Bulk string length is negative (but not -1 for null)
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Array count is negative (but not -1 for null)
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// Protocol violation (missing CRLF, nesting too deep)
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// The value exceeds the maximum allowed size
    #[error("message too large: {size} (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Result type for decoding operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum element count for a single array
pub const MAX_ARRAY_LEN: usize = 1024 * 1024;

/// Maximum array nesting depth (prevent stack overflow)
pub const MAX_NESTING_DEPTH: usize = 32;

/// An incremental wire decoder.
///
/// # Example
///
/// ```
/// use redlite::protocol::{RespParser, Value};
///
/// let mut parser = RespParser::new();
/// let buf = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
///
/// let (value, consumed) = parser.parse(buf).unwrap().unwrap();
/// assert_eq!(consumed, buf.len());
/// assert_eq!(value, Value::list(vec![Value::string("GET"), Value::string("name")]));
/// ```
#[derive(Debug, Default, Clone)]
pub struct RespParser {
    /// Current nesting depth (for array parsing)
    depth: usize,
    /// Decode canonical numeric bulk strings as integers
    infer_integers: bool,
}

impl RespParser {
    /// Creates a parser that keeps bulk strings as strings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a parser with integer inference switched on or off.
    pub fn with_integer_inference(infer_integers: bool) -> Self {
        Self {
            depth: 0,
            infer_integers,
        }
    }

    /// Returns true if this parser re-types numeric bulk strings.
    pub fn infers_integers(&self) -> bool {
        self.infer_integers
    }

    /// Attempts to decode one value from the front of the buffer.
    ///
    /// # Returns
    ///
    /// - `Ok(Some((value, consumed)))` - Successfully decoded a value
    /// - `Ok(None)` - Incomplete data, need more bytes
    /// - `Err(e)` - Malformed data
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(Value, usize)>> {
        self.depth = 0;
        self.parse_value(buf)
    }

    fn parse_value(&mut self, buf: &[u8]) -> ParseResult<Option<(Value, usize)>> {
        if buf.is_empty() {
            return Ok(None);
        }

        if self.depth > MAX_NESTING_DEPTH {
            return Err(ParseError::ProtocolError(format!(
                "maximum nesting depth exceeded: {}",
                MAX_NESTING_DEPTH
            )));
        }

        match buf[0] {
            prefix::SIMPLE_STRING | prefix::ERROR => Ok(parse_line(buf)),
            prefix::INTEGER => self.parse_integer(buf),
            prefix::BULK_STRING => self.parse_bulk_string(buf),
            prefix::ARRAY => self.parse_array(buf),
            other => Err(ParseError::UnknownPrefix(other)),
        }
    }

    /// Parses an integer: `:<integer>\r\n`
    fn parse_integer(&mut self, buf: &[u8]) -> ParseResult<Option<(Value, usize)>> {
        debug_assert!(buf[0] == prefix::INTEGER);

        match read_number_line(buf)? {
            Some((n, consumed)) => Ok(Some((Value::Integer(n), consumed))),
            None => Ok(None),
        }
    }

    /// Parses a bulk string: `$<length>\r\n<data>\r\n`
    fn parse_bulk_string(&mut self, buf: &[u8]) -> ParseResult<Option<(Value, usize)>> {
        debug_assert!(buf[0] == prefix::BULK_STRING);

        let (length, data_start) = match read_number_line(buf)? {
            Some(header) => header,
            None => return Ok(None),
        };

        if length == -1 {
            return Ok(Some((Value::Null, data_start)));
        }
        if length < 0 {
            return Err(ParseError::InvalidBulkLength(length));
        }

        let length = length as usize;
        if length > MAX_BULK_SIZE {
            return Err(ParseError::MessageTooLarge {
                size: length,
                max: MAX_BULK_SIZE,
            });
        }

        let total_needed = data_start + length + 2;
        if buf.len() < total_needed {
            return Ok(None);
        }

        if &buf[data_start + length..total_needed] != CRLF {
            return Err(ParseError::ProtocolError(
                "bulk string missing trailing CRLF".to_string(),
            ));
        }

        let payload = &buf[data_start..data_start + length];
        if self.infer_integers {
            if let Some(n) = canonical_integer(payload) {
                return Ok(Some((Value::Integer(n), total_needed)));
            }
        }

        Ok(Some((
            Value::String(Bytes::copy_from_slice(payload)),
            total_needed,
        )))
    }

    /// Parses an array: `*<count>\r\n<elements...>`
    fn parse_array(&mut self, buf: &[u8]) -> ParseResult<Option<(Value, usize)>> {
        debug_assert!(buf[0] == prefix::ARRAY);

        let (count, mut consumed) = match read_number_line(buf)? {
            Some(header) => header,
            None => return Ok(None),
        };

        if count == -1 {
            return Ok(Some((Value::Null, consumed)));
        }
        if count < 0 {
            return Err(ParseError::InvalidArrayLength(count));
        }

        let count = count as usize;
        if count > MAX_ARRAY_LEN {
            return Err(ParseError::MessageTooLarge {
                size: count,
                max: MAX_ARRAY_LEN,
            });
        }

        let mut elements = Vec::with_capacity(count.min(64));

        self.depth += 1;
        for _ in 0..count {
            match self.parse_value(&buf[consumed..])? {
                Some((value, element_consumed)) => {
                    elements.push(value);
                    consumed += element_consumed;
                }
                None => return Ok(None),
            }
        }
        self.depth -= 1;

        Ok(Some((Value::List(elements), consumed)))
    }
}

/// Parses a `+` or `-` line. Both decode as strings; an error line carries
/// its meaning only through the caller's context.
fn parse_line(buf: &[u8]) -> Option<(Value, usize)> {
    find_crlf(&buf[1..]).map(|pos| {
        let content = Bytes::copy_from_slice(&buf[1..1 + pos]);
        (Value::String(content), 1 + pos + 2)
    })
}

/// Reads `<prefix><decimal>\r\n` and returns the number and the bytes used.
fn read_number_line(buf: &[u8]) -> ParseResult<Option<(i64, usize)>> {
    let end = match find_crlf(&buf[1..]) {
        Some(pos) => pos,
        None => return Ok(None),
    };

    let text =
        std::str::from_utf8(&buf[1..1 + end]).map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
    // `i64::from_str` takes a leading '+', the wire format does not
    if text.starts_with('+') {
        return Err(ParseError::InvalidInteger(format!("{:?}: explicit sign", text)));
    }
    let n: i64 = text
        .parse()
        .map_err(|e: ParseIntError| ParseError::InvalidInteger(format!("{:?}: {}", text, e)))?;

    Ok(Some((n, 1 + end + 2)))
}

/// Returns the integer if `payload` is exactly its canonical decimal form.
fn canonical_integer(payload: &[u8]) -> Option<i64> {
    let text = std::str::from_utf8(payload).ok()?;
    let n: i64 = text.parse().ok()?;
    (n.to_string() == text).then_some(n)
}

/// Finds the position of CRLF in the buffer.
///
/// Returns the position of `\r` if found, or None if CRLF is not present.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// Decodes exactly one value from `buf`, returning it and the number of bytes
/// used. Bytes after the value are not inspected.
///
/// Unlike [`RespParser::parse`], a truncated value is an error.
pub fn decode(buf: &[u8]) -> ParseResult<(Value, usize)> {
    decode_with(&mut RespParser::new(), buf)
}

/// [`decode`] using a caller-configured parser.
pub fn decode_with(parser: &mut RespParser, buf: &[u8]) -> ParseResult<(Value, usize)> {
    if buf.is_empty() {
        return Err(ParseError::EmptyInput);
    }
    parser.parse(buf)?.ok_or(ParseError::Incomplete)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::Encoding;

    fn parse_message(buf: &[u8]) -> ParseResult<Option<(Value, usize)>> {
        RespParser::new().parse(buf)
    }

    #[test]
    fn test_parse_simple_string() {
        let (value, consumed) = decode(b"+OK\r\n").unwrap();
        assert_eq!(value, Value::string("OK"));
        assert_eq!(consumed, 5);
    }

    #[test]
    fn test_parse_simple_string_incomplete() {
        assert!(parse_message(b"+OK").unwrap().is_none());
        assert_eq!(decode(b"+OK"), Err(ParseError::Incomplete));
    }

    #[test]
    fn test_parse_error_line_as_string() {
        let (value, consumed) = decode(b"-ERR unknown command\r\n").unwrap();
        assert_eq!(value, Value::string("ERR unknown command"));
        assert_eq!(consumed, 22);
    }

    #[test]
    fn test_parse_integer() {
        let (value, consumed) = decode(b":1000\r\n").unwrap();
        assert_eq!(value, Value::Integer(1000));
        assert_eq!(consumed, 7);

        let (value, _) = decode(b":-42\r\n").unwrap();
        assert_eq!(value, Value::Integer(-42));
    }

    #[test]
    fn test_parse_invalid_integer() {
        let result = decode(b":not_a_number\r\n");
        assert!(matches!(result, Err(ParseError::InvalidInteger(_))));
    }

    #[test]
    fn test_parse_bulk_string() {
        let (value, consumed) = decode(b"$5\r\nhello\r\n").unwrap();
        assert_eq!(value, Value::string("hello"));
        assert_eq!(consumed, 11);
    }

    #[test]
    fn test_parse_null_forms() {
        assert_eq!(decode(b"$-1\r\n").unwrap(), (Value::Null, 5));
        assert_eq!(decode(b"*-1\r\n").unwrap(), (Value::Null, 5));
    }

    #[test]
    fn test_parse_empty_bulk_string() {
        let (value, consumed) = decode(b"$0\r\n\r\n").unwrap();
        assert_eq!(value, Value::string(""));
        assert_eq!(consumed, 6);
    }

    #[test]
    fn test_parse_bulk_string_truncated() {
        assert!(parse_message(b"$5\r\nhel").unwrap().is_none());
        assert_eq!(decode(b"$5\r\nhel"), Err(ParseError::Incomplete));
    }

    #[test]
    fn test_parse_bulk_string_trailer_mismatch() {
        let result = decode(b"$3\r\nhelXX");
        assert!(matches!(result, Err(ParseError::ProtocolError(_))));
    }

    #[test]
    fn test_parse_bulk_non_numeric_length() {
        let result = decode(b"$abc\r\nhello\r\n");
        assert!(matches!(result, Err(ParseError::InvalidInteger(_))));
    }

    #[test]
    fn test_parse_rejects_plus_sign_in_numbers() {
        for input in [&b"$+5\r\nhello\r\n"[..], b"*+1\r\n:1\r\n", b":+7\r\n"] {
            let result = decode(input);
            assert!(
                matches!(result, Err(ParseError::InvalidInteger(_))),
                "accepted {:?}",
                String::from_utf8_lossy(input)
            );
        }
    }

    #[test]
    fn test_parse_negative_lengths() {
        assert_eq!(decode(b"$-2\r\n"), Err(ParseError::InvalidBulkLength(-2)));
        assert_eq!(decode(b"*-5\r\n"), Err(ParseError::InvalidArrayLength(-5)));
    }

    #[test]
    fn test_parse_array() {
        let (value, consumed) = decode(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n").unwrap();
        assert_eq!(
            value,
            Value::list(vec![Value::string("GET"), Value::string("name")])
        );
        assert_eq!(consumed, 23);
    }

    #[test]
    fn test_parse_empty_array() {
        assert_eq!(decode(b"*0\r\n").unwrap(), (Value::list(vec![]), 4));
    }

    #[test]
    fn test_parse_nested_mixed_array() {
        let (value, _) = decode(b"*3\r\n+OK\r\n*2\r\n:2\r\n$-1\r\n$5\r\nhello\r\n").unwrap();
        assert_eq!(
            value,
            Value::list(vec![
                Value::string("OK"),
                Value::list(vec![Value::Integer(2), Value::Null]),
                Value::string("hello"),
            ])
        );
    }

    #[test]
    fn test_parse_array_with_truncated_element() {
        assert_eq!(
            decode(b"*2\r\n$3\r\nGET\r\n$4\r\nna"),
            Err(ParseError::Incomplete)
        );
    }

    #[test]
    fn test_parse_array_with_malformed_element() {
        let result = decode(b"*2\r\n$3\r\nGET\r\n:x\r\n");
        assert!(matches!(result, Err(ParseError::InvalidInteger(_))));
    }

    #[test]
    fn test_unknown_prefix() {
        assert_eq!(decode(b"@bad\r\n"), Err(ParseError::UnknownPrefix(b'@')));
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(decode(b""), Err(ParseError::EmptyInput));
    }

    #[test]
    fn test_nesting_limit() {
        let mut input = Vec::new();
        for _ in 0..(MAX_NESTING_DEPTH + 2) {
            input.extend_from_slice(b"*1\r\n");
        }
        input.extend_from_slice(b":1\r\n");
        assert!(matches!(
            decode(&input),
            Err(ParseError::ProtocolError(_))
        ));
    }

    #[test]
    fn test_leftover_bytes_are_not_consumed() {
        let input = b"+OK\r\n:5\r\n";
        let (value, consumed) = decode(input).unwrap();
        assert_eq!(value, Value::string("OK"));
        assert_eq!(&input[consumed..], b":5\r\n");
    }

    #[test]
    fn test_binary_safe_bulk_string() {
        let (value, _) = decode(b"$5\r\nhel\x00o\r\n").unwrap();
        assert_eq!(value, Value::String(Bytes::from(&b"hel\x00o"[..])));
    }

    #[test]
    fn test_numeric_bulk_stays_string_by_default() {
        let (value, _) = decode(b"$4\r\n1234\r\n").unwrap();
        assert_eq!(value, Value::string("1234"));
    }

    #[test]
    fn test_integer_inference() {
        let mut parser = RespParser::with_integer_inference(true);
        assert!(parser.infers_integers());

        let (value, _) = decode_with(&mut parser, b"$4\r\n1234\r\n").unwrap();
        assert_eq!(value, Value::Integer(1234));

        let (value, _) = decode_with(&mut parser, b"$2\r\n-7\r\n").unwrap();
        assert_eq!(value, Value::Integer(-7));

        // non-canonical forms stay strings
        let (value, _) = decode_with(&mut parser, b"$3\r\n007\r\n").unwrap();
        assert_eq!(value, Value::string("007"));
        let (value, _) = decode_with(&mut parser, b"$2\r\n+1\r\n").unwrap();
        assert_eq!(value, Value::string("+1"));
    }

    #[test]
    fn test_roundtrip_nested_value() {
        let original = Value::list(vec![
            Value::string("SET"),
            Value::Integer(-3),
            Value::list(vec![Value::string("a\r\nb"), Value::Null, Value::list(vec![])]),
        ]);

        let encoded = original.encode(Encoding::Data);
        let (decoded, consumed) = decode(&encoded).unwrap();
        assert_eq!(decoded, original);
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn test_roundtrip_empty_string_collapses_to_null() {
        let encoded = Value::string("").encode(Encoding::Data);
        let (decoded, _) = decode(&encoded).unwrap();
        assert_eq!(decoded, Value::Null);
    }
}
