//! Command Module
//!
//! Decoding of client requests into typed commands. Execution lives in the
//! dispatcher, which is the only place allowed to touch the store.
//!
//! ```text
//! received chunk
//!       │
//!       ▼
//! ┌─────────────────┐
//! │   RespReader    │  (protocol module)
//! └────────┬────────┘
//!          │ RespValue
//!          ▼
//! ┌─────────────────┐
//! │ CommandDecoder  │  (this module)
//! └────────┬────────┘
//!          │ Command
//!          ▼
//! ┌─────────────────┐
//! │   Dispatcher    │  (server module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `SET key value` - store a value, no reply
//! - `GET key` - reply with the raw value bytes, no reply on a miss

pub mod decoder;

pub use decoder::{parse_command, Command, CommandDecoder, ProtocolError};
