//! # LoopKV - An Event-Loop Key-Value Server
//!
//! LoopKV is an in-memory key-value server speaking a minimal RESP command
//! set (`SET`, `GET`). Its defining feature is the concurrency model: all
//! mutable state belongs to one dispatcher task, and every connection talks
//! to it by message passing.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               LoopKV                                    │
//! │                                                                         │
//! │  ┌─────────────┐  spawn  ┌─────────────┐                                │
//! │  │ AcceptLoop  │────────>│ Connection  │ one task per client            │
//! │  │ (Listener)  │         │ read loop   │                                │
//! │  └─────────────┘         └──────┬──────┘                                │
//! │                                 │ register / Message / deregister       │
//! │                                 ▼                                       │
//! │  ┌─────────────┐    ┌───────────────────────────────────────────────┐   │
//! │  │   RESP      │    │                 Dispatcher                    │   │
//! │  │   Reader    │<───│  peer registry        MemoryStore             │   │
//! │  │ + Command   │    │  (PeerId -> Peer)     (HashMap<Bytes, Bytes>) │   │
//! │  │   Decoder   │    └──────────────────────────┬────────────────────┘   │
//! │  └─────────────┘                               │ GET reply              │
//! │                                                ▼                        │
//! │                                     originating client socket           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use loopkv::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let server = Server::bind(ServerConfig::default()).await?;
//!     server
//!         .run_until(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `SET key value` - stores the value; the server sends nothing back
//! - `GET key` - the raw value bytes are written back on a hit; nothing on a miss
//!
//! Malformed requests, wrong arities and unknown verbs are logged and
//! otherwise ignored. The connection stays open.
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP value model and sequential decoder
//! - [`commands`]: turning decoded values into [`Command`]s
//! - [`storage`]: the [`Store`] trait and [`MemoryStore`]
//! - [`connection`]: per-client read loop and the [`Peer`] write side
//! - [`server`]: dispatcher event loop, accept loop, [`Server`]
//! - [`client`]: async client for the command set
//! - [`config`]: [`ServerConfig`] and argument parsing
//!
//! ## Design Highlights
//!
//! ### Single owner, no locks
//!
//! The store and the peer registry are moved into the dispatcher task and
//! never shared. Operations from different clients are applied in the order
//! they reach the dispatcher, which is also the last-write-wins order.
//!
//! ### Registration before traffic
//!
//! A connection waits for the dispatcher to acknowledge its registration
//! before reading from its socket, and deregisters when its read loop ends,
//! so the registry holds exactly the live clients.
//!
//! ### Backpressure
//!
//! The dispatcher's inbound channel is bounded. A connection that cannot
//! queue a message stops reading its socket until there is room.

pub mod client;
pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use client::{Client, ClientError};
pub use commands::{parse_command, Command, CommandDecoder, ProtocolError};
pub use config::{CliAction, ConfigError, ServerConfig};
pub use connection::{Connection, ConnectionError, Peer, PeerId};
pub use protocol::{ParseError, RespReader, RespValue};
pub use server::{DispatchReport, DispatchStats, Dispatcher, DispatcherHandle, Server};
pub use storage::{MemoryStore, Store, StoreError};

/// The default port LoopKV listens on
pub const DEFAULT_PORT: u16 = 5001;

/// The default host LoopKV binds to (all interfaces)
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Version of LoopKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
