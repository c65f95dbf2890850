//! Storage Module
//!
//! The key-value state of the server: a [`Store`] trait describing what the
//! dispatcher needs, and [`MemoryStore`], the in-memory implementation.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │      Dispatcher task         │
//! │  ┌────────────────────────┐  │
//! │  │      MemoryStore       │  │
//! │  │ HashMap<Bytes, Bytes>  │  │
//! │  └────────────────────────┘  │
//! └──────────────────────────────┘
//! ```
//!
//! There are no locks: the store is moved into the dispatcher task at
//! startup and never shared.

pub mod store;

pub use store::{MemoryStore, Store, StoreError};
