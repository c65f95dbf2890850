//! Server Module
//!
//! Wires the pieces together: a listener, the accept loop, one connection
//! task per client, and the dispatcher that owns the store.
//!
//! ```text
//!        ┌──────────────┐  spawn   ┌──────────────┐
//!        │  AcceptLoop  │─────────>│  Connection  │ ×N
//!        └──────────────┘          └──────┬───────┘
//!                                         │ Message / PeerEvent
//!                                         ▼
//!                                  ┌──────────────┐
//!                                  │  Dispatcher  │ ×1
//!                                  │ MemoryStore  │
//!                                  └──────────────┘
//! ```
//!
//! Shutdown is a `watch` signal seen by all three kinds of task. The
//! accept loop stops accepting, connections stop reading and drop their
//! sockets, and the dispatcher stops and drops the registry.

pub mod dispatcher;
pub mod listener;

pub use dispatcher::{
    DispatchReport, DispatchStats, Dispatcher, DispatcherClosed, DispatcherConfig,
    DispatcherHandle, Message, PeerEvent,
};
pub use listener::{AcceptLoop, Backoff};

use crate::config::ServerConfig;
use crate::connection::ConnectionContext;
use crate::storage::{MemoryStore, Store};
use anyhow::Context;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

/// A bound, not yet running server.
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
}

impl Server {
    /// Binds the listening socket. This is the only fatal step.
    pub async fn bind(config: ServerConfig) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(config.bind_address())
            .await
            .with_context(|| format!("failed to bind {}", config.bind_address()))?;

        Ok(Self { listener, config })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves clients until `shutdown` completes, then stops every task and
    /// returns what the dispatcher held.
    pub async fn run_until<F>(self, shutdown: F) -> anyhow::Result<DispatchReport<MemoryStore>>
    where
        F: Future<Output = ()> + Send,
    {
        let Server { listener, config } = self;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let store = match config.max_keys {
            Some(max) => MemoryStore::with_max_keys(max),
            None => MemoryStore::new(),
        };
        let max_keys = store.max_keys();
        let (dispatcher, handle) =
            dispatcher::channel(store, config.dispatcher_config(), shutdown_rx.clone());
        let dispatcher = tokio::spawn(dispatcher.run());

        let ctx = ConnectionContext::new(handle, shutdown_rx).with_read_size(config.read_buffer_size);
        let backoff = Backoff::new(config.accept_backoff_initial, config.accept_backoff_max);
        let accept = tokio::spawn(AcceptLoop::new(listener, ctx, backoff).run());

        info!(
            addr = %local_addr,
            pipelining = config.pipelining,
            max_keys = ?max_keys,
            "server running"
        );

        shutdown.await;
        info!("shutdown signal received, stopping server");
        // Only fails when every task has already stopped on its own.
        let _ = shutdown_tx.send(true);

        accept.await.context("accept loop panicked")?;
        let report = dispatcher.await.context("dispatcher panicked")?;

        info!(
            keys = report.store.len(),
            live_peers = report.live_peers,
            "server shutdown complete"
        );
        Ok(report)
    }
}
