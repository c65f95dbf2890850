//! Connection Module
//!
//! Bridges client sockets to the dispatcher.
//!
//! ```text
//!                 TcpStream
//!                     │ into_split()
//!          ┌──────────┴──────────┐
//!          ▼                     ▼
//!   ┌─────────────┐       ┌─────────────┐
//!   │ Connection  │       │    Peer     │
//!   │ (read half) │       │(write half) │
//!   │ own task    │       │ owned by the│
//!   └──────┬──────┘       │ dispatcher  │
//!          │ Message      └──────▲──────┘
//!          ▼                     │ GET reply
//!   ┌────────────────────────────┴──┐
//!   │          Dispatcher           │
//!   └───────────────────────────────┘
//! ```
//!
//! A connection only ever reads its own socket, and only the dispatcher
//! writes to it, through the registered [`Peer`].

pub mod handler;
pub mod peer;

pub use handler::{
    handle_connection, Connection, ConnectionContext, ConnectionError, DEFAULT_READ_SIZE,
};
pub use peer::{Peer, PeerId, PeerWriter};
