//! Command Decoder
//!
//! Turns a received chunk into typed [`Command`]s.
//!
//! ## Matching rules
//!
//! 1. Values are decoded from the chunk one at a time.
//! 2. Values that are not arrays carry no command and are skipped.
//! 3. The elements of an array are scanned in order for a verb, compared
//!    case-insensitively against `GET` and `SET`.
//! 4. The first verb found decides the command, and the arity of the whole
//!    array must match it: 2 for `GET key`, 3 for `SET key value`.
//! 5. Arrays without a verb are skipped like non-array values.
//!
//! [`parse_command`] stops at the first command and reports
//! [`ProtocolError::UnknownCommand`] if the chunk runs out without one.
//! [`CommandDecoder`] keeps going and yields every command in the chunk.

use crate::protocol::{ParseError, RespReader, RespValue};
use bytes::Bytes;
use thiserror::Error;
use tracing::trace;

/// A decoded, validated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `SET key value`
    Set { key: Bytes, value: Bytes },
    /// `GET key`
    Get { key: Bytes },
}

impl Command {
    /// The verb this command was decoded from.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Set { .. } => Verb::Set.name(),
            Command::Get { .. } => Verb::Get.name(),
        }
    }
}

/// Why a chunk did not produce a command.
///
/// None of these are fatal to the connection that sent the chunk.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The wire encoding itself is broken
    #[error("malformed request: {0}")]
    Malformed(#[from] ParseError),

    /// A verb was found but the array has the wrong number of elements
    #[error("wrong number of arguments for '{command}' command: expected {expected}, got {got}")]
    WrongArity {
        command: &'static str,
        expected: usize,
        got: usize,
    },

    /// A key or value element has no scalar form (null or nested array)
    #[error("invalid argument at position {index} for '{command}' command")]
    InvalidArgument { command: &'static str, index: usize },

    /// The chunk was exhausted without finding a command
    #[error("unknown command")]
    UnknownCommand,
}

/// Decodes the first command found in `buf`.
///
/// # Example
///
/// ```
/// use loopkv::commands::{parse_command, Command};
/// use bytes::Bytes;
///
/// let command = parse_command(&b"*2\r\n$3\r\nget\r\n$3\r\nfoo\r\n"[..]).unwrap();
/// assert_eq!(command, Command::Get { key: Bytes::from("foo") });
/// ```
pub fn parse_command(buf: impl Into<Bytes>) -> Result<Command, ProtocolError> {
    CommandDecoder::new(buf)
        .next()
        .unwrap_or(Err(ProtocolError::UnknownCommand))
}

/// Lazily yields every command contained in a chunk.
///
/// Arity and argument errors are yielded in place of the offending command
/// and decoding continues with the next value. A malformed encoding is
/// yielded once and ends the sequence.
#[derive(Debug, Clone)]
pub struct CommandDecoder {
    reader: RespReader,
}

impl CommandDecoder {
    pub fn new(buf: impl Into<Bytes>) -> Self {
        Self {
            reader: RespReader::new(buf),
        }
    }
}

impl Iterator for CommandDecoder {
    type Item = Result<Command, ProtocolError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let value = match self.reader.next()? {
                Ok(value) => value,
                Err(e) => return Some(Err(e.into())),
            };

            let Some(elements) = value.as_array() else {
                trace!(%value, "skipping non-array value");
                continue;
            };

            match elements.iter().find_map(Verb::parse) {
                Some(verb) => return Some(verb.build(elements)),
                None => trace!(%value, "skipping array without a known verb"),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Get,
    Set,
}

impl Verb {
    const ALL: [Verb; 2] = [Verb::Get, Verb::Set];

    fn parse(value: &RespValue) -> Option<Verb> {
        Self::ALL
            .into_iter()
            .find(|verb| value.eq_ignore_case(verb.name()))
    }

    fn name(self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Set => "SET",
        }
    }

    /// Element count of a well-formed array, verb included.
    fn arity(self) -> usize {
        match self {
            Verb::Get => 2,
            Verb::Set => 3,
        }
    }

    fn build(self, elements: &[RespValue]) -> Result<Command, ProtocolError> {
        if elements.len() != self.arity() {
            return Err(ProtocolError::WrongArity {
                command: self.name(),
                expected: self.arity(),
                got: elements.len(),
            });
        }

        let arg = |index: usize| {
            elements[index]
                .to_bytes()
                .ok_or(ProtocolError::InvalidArgument {
                    command: self.name(),
                    index,
                })
        };

        Ok(match self {
            Verb::Get => Command::Get { key: arg(1)? },
            Verb::Set => Command::Set {
                key: arg(1)?,
                value: arg(2)?,
            },
        })
    }
}
