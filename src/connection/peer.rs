//! The write side of a connected client.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Identifier handed out by the accept loop, unique for the process lifetime.
pub type PeerId = u64;

/// Anything a reply can be written to.
pub type PeerWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A registered client as the dispatcher sees it.
///
/// Holds the only writer for the client's socket. The dispatcher owns every
/// `Peer` in its registry; dropping one closes the write side of the socket.
pub struct Peer {
    id: PeerId,
    addr: SocketAddr,
    writer: PeerWriter,
}

impl Peer {
    pub fn new<W>(id: PeerId, addr: SocketAddr, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            id,
            addr,
            writer: Box::new(writer),
        }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Writes `data` to the client and flushes it.
    ///
    /// Transport errors are returned unchanged; the peer stays usable as far
    /// as this type is concerned.
    pub async fn send(&mut self, data: &[u8]) -> io::Result<usize> {
        self.writer.write_all(data).await?;
        self.writer.flush().await?;
        Ok(data.len())
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}
