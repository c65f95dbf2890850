//! RESP Wire Encoding
//!
//! The server speaks the array-of-bulk-strings dialect of the Redis
//! Serialization Protocol. Only a small surface of it matters to the rest of
//! the crate:
//!
//! - decode the next value from a received chunk ([`RespReader`])
//! - ask whether a value is an array and walk its elements
//! - take the raw bytes of a scalar, or compare it against a command verb
//!
//! Encoding ([`RespValue::serialize`]) is used by the client side to frame
//! commands.
//!
//! ## Example
//!
//! ```
//! use loopkv::protocol::{RespReader, RespValue};
//!
//! let frame = RespValue::command(["GET", "name"]).serialize();
//! let mut reader = RespReader::new(frame);
//!
//! let value = reader.read_value().unwrap().unwrap();
//! assert_eq!(value.as_array().map(<[RespValue]>::len), Some(2));
//! assert!(reader.read_value().unwrap().is_none());
//! ```

pub mod parser;
pub mod types;

pub use parser::{ParseError, ParseResult, RespReader};
pub use types::RespValue;
