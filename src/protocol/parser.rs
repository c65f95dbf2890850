//! Sequential RESP Decoder
//!
//! [`RespReader`] walks one received chunk and hands out the values encoded
//! in it, one at a time. Bulk strings are sliced out of the chunk rather than
//! copied, so a decoded key or value shares the allocation the socket read
//! filled.
//!
//! A chunk is expected to hold whole frames. A value cut off by the end of
//! the chunk is reported as [`ParseError::Incomplete`], the same as any other
//! malformed input; the reader does not wait for more bytes.
//!
//! Lines that do not start with a type prefix are decoded as inline commands
//! (`SET name Ariz\r\n`), the form telnet-style clients send.

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use std::num::ParseIntError;
use thiserror::Error;

/// Errors that can occur during RESP decoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The chunk ended in the middle of a value
    #[error("incomplete frame")]
    Incomplete,

    /// Invalid integer format
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Invalid UTF-8 in a line that must be text
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Bulk string length is negative (but not -1 for null)
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Array length is negative (but not -1 for null)
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// Bulk string payload not followed by CRLF
    #[error("bulk string missing trailing CRLF")]
    MissingCrlf,

    /// Arrays nested deeper than [`MAX_NESTING_DEPTH`]
    #[error("maximum nesting depth exceeded: {0}")]
    TooDeep(usize),

    /// The message exceeds maximum allowed size
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Inline line with no words on it
    #[error("empty inline command")]
    EmptyInline,
}

/// Result type for decoding operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum array nesting depth (prevent stack overflow)
pub const MAX_NESTING_DEPTH: usize = 32;

/// Decodes RESP values one after another from a byte chunk.
///
/// Also usable as an iterator of `ParseResult<RespValue>`. After the first
/// error the rest of the chunk is discarded: there is no way to find the
/// start of the next frame in a corrupt stream.
///
/// # Example
///
/// ```
/// use loopkv::protocol::{RespReader, RespValue};
///
/// let mut reader = RespReader::new(&b"+OK\r\n:7\r\n"[..]);
/// assert_eq!(reader.read_value(), Ok(Some(RespValue::SimpleString("OK".into()))));
/// assert_eq!(reader.read_value(), Ok(Some(RespValue::Integer(7))));
/// assert_eq!(reader.read_value(), Ok(None));
/// ```
#[derive(Debug, Clone)]
pub struct RespReader {
    buf: Bytes,
    pos: usize,
}

impl RespReader {
    /// Creates a reader positioned at the start of `buf`.
    pub fn new(buf: impl Into<Bytes>) -> Self {
        Self {
            buf: buf.into(),
            pos: 0,
        }
    }

    /// Number of bytes not yet decoded.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Decodes the next value.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(value))` - a value was decoded
    /// - `Ok(None)` - every byte of the chunk has been consumed
    /// - `Err(e)` - malformed or truncated input; the reader is now drained
    pub fn read_value(&mut self) -> ParseResult<Option<RespValue>> {
        if self.remaining() == 0 {
            return Ok(None);
        }

        match self.value(0) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                self.pos = self.buf.len();
                Err(e)
            }
        }
    }

    fn value(&mut self, depth: usize) -> ParseResult<RespValue> {
        if depth > MAX_NESTING_DEPTH {
            return Err(ParseError::TooDeep(MAX_NESTING_DEPTH));
        }

        let tag = *self.buf.get(self.pos).ok_or(ParseError::Incomplete)?;
        match tag {
            prefix::SIMPLE_STRING => {
                self.pos += 1;
                Ok(RespValue::SimpleString(self.text_line()?))
            }
            prefix::ERROR => {
                self.pos += 1;
                Ok(RespValue::Error(self.text_line()?))
            }
            prefix::INTEGER => {
                self.pos += 1;
                Ok(RespValue::Integer(self.integer_line()?))
            }
            prefix::BULK_STRING => {
                self.pos += 1;
                self.bulk_string()
            }
            prefix::ARRAY => {
                self.pos += 1;
                self.array(depth)
            }
            _ => self.inline(),
        }
    }

    /// Takes the bytes up to the next CRLF and moves past the terminator.
    fn line(&mut self) -> ParseResult<Bytes> {
        let end = find_crlf(&self.buf[self.pos..]).ok_or(ParseError::Incomplete)?;
        let line = self.buf.slice(self.pos..self.pos + end);
        self.pos += end + CRLF.len();
        Ok(line)
    }

    fn text_line(&mut self) -> ParseResult<String> {
        let line = self.line()?;
        std::str::from_utf8(&line)
            .map(str::to_owned)
            .map_err(|e| ParseError::InvalidUtf8(e.to_string()))
    }

    fn integer_line(&mut self) -> ParseResult<i64> {
        self.text_line()?
            .parse()
            .map_err(|e: ParseIntError| ParseError::InvalidInteger(e.to_string()))
    }

    /// `$<length>\r\n<data>\r\n`, prefix already consumed
    fn bulk_string(&mut self) -> ParseResult<RespValue> {
        let declared = self.integer_line()?;
        if declared == -1 {
            return Ok(RespValue::Null);
        }

        let length =
            usize::try_from(declared).map_err(|_| ParseError::InvalidBulkLength(declared))?;
        if length > MAX_BULK_SIZE {
            return Err(ParseError::MessageTooLarge {
                size: length,
                max: MAX_BULK_SIZE,
            });
        }

        let end = self.pos + length;
        if self.buf.len() < end + CRLF.len() {
            return Err(ParseError::Incomplete);
        }
        if &self.buf[end..end + CRLF.len()] != CRLF {
            return Err(ParseError::MissingCrlf);
        }

        let data = self.buf.slice(self.pos..end);
        self.pos = end + CRLF.len();
        Ok(RespValue::BulkString(data))
    }

    /// `*<count>\r\n<elements...>`, prefix already consumed
    fn array(&mut self, depth: usize) -> ParseResult<RespValue> {
        let declared = self.integer_line()?;
        if declared == -1 {
            return Ok(RespValue::Null);
        }

        let count =
            usize::try_from(declared).map_err(|_| ParseError::InvalidArrayLength(declared))?;

        // Each element takes at least three bytes, never trust the header for capacity.
        let mut elements = Vec::with_capacity(count.min(self.remaining() / 3));
        for _ in 0..count {
            elements.push(self.value(depth + 1)?);
        }

        Ok(RespValue::Array(elements))
    }

    fn inline(&mut self) -> ParseResult<RespValue> {
        let line = self.line()?;
        let words: Vec<RespValue> = line
            .split(|b| b.is_ascii_whitespace())
            .filter(|word| !word.is_empty())
            .map(|word| RespValue::BulkString(line.slice_ref(word)))
            .collect();

        if words.is_empty() {
            return Err(ParseError::EmptyInline);
        }

        Ok(RespValue::Array(words))
    }
}

impl Iterator for RespReader {
    type Item = ParseResult<RespValue>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_value().transpose()
    }
}

/// Position of the first CRLF in `buf`.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(CRLF.len()).position(|window| window == CRLF)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_one(input: &'static [u8]) -> ParseResult<Option<RespValue>> {
        RespReader::new(input).read_value()
    }

    #[test]
    fn test_simple_string() {
        assert_eq!(
            decode_one(b"+OK\r\n"),
            Ok(Some(RespValue::SimpleString("OK".to_string())))
        );
    }

    #[test]
    fn test_integer() {
        assert_eq!(decode_one(b":-42\r\n"), Ok(Some(RespValue::Integer(-42))));
    }

    #[test]
    fn test_invalid_integer() {
        assert!(matches!(
            decode_one(b":not_a_number\r\n"),
            Err(ParseError::InvalidInteger(_))
        ));
    }

    #[test]
    fn test_bulk_string() {
        assert_eq!(
            decode_one(b"$5\r\nhello\r\n"),
            Ok(Some(RespValue::BulkString(Bytes::from("hello"))))
        );
        assert_eq!(
            decode_one(b"$0\r\n\r\n"),
            Ok(Some(RespValue::BulkString(Bytes::new())))
        );
        assert_eq!(decode_one(b"$-1\r\n"), Ok(Some(RespValue::Null)));
    }

    #[test]
    fn test_binary_safe_bulk_string() {
        assert_eq!(
            decode_one(b"$5\r\nhel\x00o\r\n"),
            Ok(Some(RespValue::BulkString(Bytes::from(&b"hel\x00o"[..]))))
        );
    }

    #[test]
    fn test_bulk_string_errors() {
        assert_eq!(decode_one(b"$5\r\nhel"), Err(ParseError::Incomplete));
        assert_eq!(decode_one(b"$3\r\nhelXX"), Err(ParseError::MissingCrlf));
        assert_eq!(
            decode_one(b"$-2\r\n"),
            Err(ParseError::InvalidBulkLength(-2))
        );
    }

    #[test]
    fn test_array() {
        assert_eq!(
            decode_one(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n"),
            Ok(Some(RespValue::command(["GET", "name"])))
        );
        assert_eq!(decode_one(b"*0\r\n"), Ok(Some(RespValue::Array(vec![]))));
        assert_eq!(decode_one(b"*-1\r\n"), Ok(Some(RespValue::Null)));
    }

    #[test]
    fn test_nested_array() {
        assert_eq!(
            decode_one(b"*2\r\n:1\r\n*2\r\n:2\r\n:3\r\n"),
            Ok(Some(RespValue::Array(vec![
                RespValue::Integer(1),
                RespValue::Array(vec![RespValue::Integer(2), RespValue::Integer(3)]),
            ])))
        );
    }

    #[test]
    fn test_array_truncated() {
        assert_eq!(
            decode_one(b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n"),
            Err(ParseError::Incomplete)
        );
    }

    #[test]
    fn test_nesting_limit() {
        let input = "*1\r\n".repeat(MAX_NESTING_DEPTH + 2);
        let mut reader = RespReader::new(input);
        assert_eq!(
            reader.read_value(),
            Err(ParseError::TooDeep(MAX_NESTING_DEPTH))
        );
    }

    #[test]
    fn test_inline_command() {
        assert_eq!(
            decode_one(b"SET  name Ariz\r\n"),
            Ok(Some(RespValue::command(["SET", "name", "Ariz"])))
        );
        assert_eq!(decode_one(b"  \r\n"), Err(ParseError::EmptyInline));
    }

    #[test]
    fn test_sequential_values() {
        let mut reader = RespReader::new(&b"+OK\r\n*1\r\n$4\r\nPING\r\n:5\r\n"[..]);
        let values: Vec<_> = reader.by_ref().collect::<ParseResult<_>>().unwrap();
        assert_eq!(
            values,
            vec![
                RespValue::SimpleString("OK".to_string()),
                RespValue::command(["PING"]),
                RespValue::Integer(5),
            ]
        );
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_error_drains_reader() {
        let mut reader = RespReader::new(&b":x\r\n+OK\r\n"[..]);
        assert!(reader.next().unwrap().is_err());
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_bulk_shares_buffer() {
        let chunk = Bytes::from_static(b"$3\r\nbar\r\n");
        let value = RespReader::new(chunk.clone()).read_value().unwrap().unwrap();
        let RespValue::BulkString(data) = value else {
            panic!("expected bulk string");
        };
        assert_eq!(data.as_ptr(), chunk[4..].as_ptr());
    }
}
