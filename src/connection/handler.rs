//! Connection Read Loop
//!
//! Each accepted client gets a [`Connection`] running in its own task. The
//! connection never interprets what it reads and never touches server
//! state: it forwards every chunk to the dispatcher as a [`Message`].
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Socket split into read half and write half
//!        │
//!        ▼
//! 2. Write half wrapped in a Peer and registered with the dispatcher
//!    (waits for the acknowledgement)
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │ read chunk from socket       │
//!    │ send Message to dispatcher   │<─┐
//!    │ (waits while channel is full)│  │
//!    └──────────────┬───────────────┘  │
//!                   └──────────────────┘
//!        │ EOF / read error / shutdown
//!        ▼
//! 4. Deregister from the dispatcher, drop the read half
//! ```

use crate::connection::peer::{Peer, PeerId};
use crate::server::dispatcher::{DispatcherClosed, DispatcherHandle, Message};
use bytes::BytesMut;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// Default number of bytes reserved for each socket read
pub const DEFAULT_READ_SIZE: usize = 4096;

/// Errors that end a connection's read loop.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Client closed its side of the connection
    #[error("Client disconnected")]
    ClientDisconnected,

    /// The dispatcher is gone, nothing can be forwarded anymore
    #[error("Dispatcher closed: {0}")]
    DispatcherClosed(#[from] DispatcherClosed),
}

/// What every connection needs from the server, cloned once per accept.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub dispatcher: DispatcherHandle,
    pub shutdown: watch::Receiver<bool>,
    pub read_size: usize,
}

impl ConnectionContext {
    pub fn new(dispatcher: DispatcherHandle, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            dispatcher,
            shutdown,
            read_size: DEFAULT_READ_SIZE,
        }
    }

    pub fn with_read_size(mut self, read_size: usize) -> Self {
        self.read_size = read_size.max(1);
        self
    }
}

/// The read half of a registered client.
pub struct Connection<R> {
    id: PeerId,
    addr: SocketAddr,
    reader: R,
    buffer: BytesMut,
    ctx: ConnectionContext,
}

impl<R> Connection<R>
where
    R: AsyncRead + Unpin,
{
    /// Registers the client's write half with the dispatcher and returns the
    /// read side, ready to run.
    ///
    /// Registration completes before this returns, so the dispatcher knows
    /// the peer before it can see any of its messages.
    pub async fn establish<W>(
        id: PeerId,
        addr: SocketAddr,
        reader: R,
        writer: W,
        ctx: ConnectionContext,
    ) -> Result<Self, ConnectionError>
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        ctx.dispatcher.register(Peer::new(id, addr, writer)).await?;

        Ok(Self {
            id,
            addr,
            reader,
            buffer: BytesMut::with_capacity(ctx.read_size),
            ctx,
        })
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Runs the read loop, then deregisters the peer.
    ///
    /// Returns `Ok(())` when stopped by the shutdown signal, otherwise the
    /// error that ended the loop (`ClientDisconnected` on EOF).
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        let result = self.read_loop().await;

        if let Err(e) = self.ctx.dispatcher.deregister(self.id).await {
            debug!(peer = self.id, error = %e, "could not deregister peer");
        }

        result
    }

    async fn read_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            if *self.ctx.shutdown.borrow_and_update() {
                return Ok(());
            }

            if self.buffer.capacity() < self.ctx.read_size {
                self.buffer.reserve(self.ctx.read_size);
            }

            let n = tokio::select! {
                read = self.reader.read_buf(&mut self.buffer) => read?,
                _ = self.ctx.shutdown.changed() => return Ok(()),
            };

            if n == 0 {
                return Err(ConnectionError::ClientDisconnected);
            }

            let payload = self.buffer.split().freeze();
            trace!(peer = self.id, addr = %self.addr, bytes = n, "read chunk");

            let message = Message {
                payload,
                origin: self.id,
            };
            tokio::select! {
                delivered = self.ctx.dispatcher.deliver(message) => delivered?,
                _ = self.ctx.shutdown.changed() => return Ok(()),
            }
        }
    }
}

/// Serves one accepted TCP client until it goes away.
///
/// Registration failures and read loop errors are logged here; nothing is
/// returned to the accept loop.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    id: PeerId,
    ctx: ConnectionContext,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(peer = id, addr = %addr, error = %e, "could not set TCP_NODELAY");
    }

    let (reader, writer) = stream.into_split();
    let connection = match Connection::establish(id, addr, reader, writer, ctx).await {
        Ok(connection) => connection,
        Err(e) => {
            warn!(peer = id, addr = %addr, error = %e, "failed to register peer");
            return;
        }
    };

    let (id, addr) = (connection.id(), connection.addr());
    info!(peer = id, addr = %addr, "new peer connected");

    match connection.run().await {
        Ok(()) => debug!(peer = id, addr = %addr, "connection closed by shutdown"),
        Err(ConnectionError::ClientDisconnected) => {
            info!(peer = id, addr = %addr, "peer disconnected")
        }
        Err(ConnectionError::Io(ref e)) if e.kind() == std::io::ErrorKind::ConnectionReset => {
            debug!(peer = id, addr = %addr, "connection reset by peer")
        }
        Err(e) => warn!(peer = id, addr = %addr, error = %e, "peer read loop error"),
    }
}
