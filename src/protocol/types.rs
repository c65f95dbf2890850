//! RESP (Redis Serialization Protocol) Data Types
//!
//! Each RESP value starts with a type prefix byte and is terminated with
//! CRLF (`\r\n`):
//!
//! - `+` Simple String: `+OK\r\n`
//! - `-` Error: `-ERR unknown command\r\n`
//! - `:` Integer: `:1000\r\n`
//! - `$` Bulk String: `$5\r\nhello\r\n` (null: `$-1\r\n`)
//! - `*` Array: `*2\r\n$3\r\nGET\r\n$4\r\nname\r\n` (null: `*-1\r\n`)

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// The CRLF terminator used in RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// RESP protocol type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A decoded RESP value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Non binary-safe status string.
    SimpleString(String),

    /// Error string sent by a peer.
    Error(String),

    /// 64-bit signed integer.
    Integer(i64),

    /// Binary-safe string. Shares the buffer it was decoded from.
    BulkString(Bytes),

    /// Null bulk string or null array.
    Null,

    /// Ordered collection of values, possibly nested.
    Array(Vec<RespValue>),
}

impl RespValue {
    /// Creates a bulk string value.
    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(data.into())
    }

    /// Creates an array value.
    pub fn array(values: Vec<RespValue>) -> Self {
        RespValue::Array(values)
    }

    /// Builds a command frame: an array with one bulk string per part.
    ///
    /// # Example
    /// ```
    /// use loopkv::protocol::RespValue;
    ///
    /// let frame = RespValue::command(["SET", "name", "Ariz"]);
    /// assert_eq!(
    ///     &frame.serialize()[..],
    ///     b"*3\r\n$3\r\nSET\r\n$4\r\nname\r\n$4\r\nAriz\r\n"
    /// );
    /// ```
    pub fn command<I, T>(parts: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Bytes>,
    {
        RespValue::Array(parts.into_iter().map(RespValue::bulk_string).collect())
    }

    /// Encodes the value into its wire form.
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.serialize_into(&mut buf);
        buf.freeze()
    }

    /// Encodes the value at the end of `buf`.
    pub fn serialize_into(&self, buf: &mut BytesMut) {
        match self {
            RespValue::SimpleString(s) => put_line(buf, prefix::SIMPLE_STRING, s.as_bytes()),
            RespValue::Error(s) => put_line(buf, prefix::ERROR, s.as_bytes()),
            RespValue::Integer(n) => put_line(buf, prefix::INTEGER, n.to_string().as_bytes()),
            RespValue::BulkString(data) => {
                put_line(buf, prefix::BULK_STRING, data.len().to_string().as_bytes());
                buf.put_slice(data);
                buf.put_slice(CRLF);
            }
            RespValue::Null => put_line(buf, prefix::BULK_STRING, b"-1"),
            RespValue::Array(values) => {
                put_line(buf, prefix::ARRAY, values.len().to_string().as_bytes());
                for value in values {
                    value.serialize_into(buf);
                }
            }
        }
    }

    /// Returns the elements of an array value (null arrays decode as
    /// [`RespValue::Null`] and have none).
    pub fn as_array(&self) -> Option<&[RespValue]> {
        match self {
            RespValue::Array(values) => Some(values.as_slice()),
            _ => None,
        }
    }

    /// Raw bytes of a scalar value.
    ///
    /// Bulk strings hand out a shared view of their buffer; simple strings,
    /// errors and integers yield their textual form. Null and arrays have no
    /// scalar form.
    pub fn to_bytes(&self) -> Option<Bytes> {
        match self {
            RespValue::BulkString(data) => Some(data.clone()),
            RespValue::SimpleString(s) | RespValue::Error(s) => Some(Bytes::from(s.clone())),
            RespValue::Integer(n) => Some(Bytes::from(n.to_string())),
            RespValue::Null | RespValue::Array(_) => None,
        }
    }

    /// Compares the scalar form of the value against `word`, ignoring ASCII case.
    pub fn eq_ignore_case(&self, word: &str) -> bool {
        match self {
            RespValue::BulkString(data) => data.eq_ignore_ascii_case(word.as_bytes()),
            RespValue::SimpleString(s) => s.eq_ignore_ascii_case(word),
            _ => false,
        }
    }
}

fn put_line(buf: &mut BytesMut, tag: u8, body: &[u8]) {
    buf.put_u8(tag);
    buf.put_slice(body);
    buf.put_slice(CRLF);
}

impl fmt::Display for RespValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RespValue::SimpleString(s) => write!(f, "+{}", s),
            RespValue::Error(s) => write!(f, "(error) {}", s),
            RespValue::Integer(n) => write!(f, "(integer) {}", n),
            RespValue::BulkString(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
            },
            RespValue::Null => write!(f, "(nil)"),
            RespValue::Array(values) => {
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
