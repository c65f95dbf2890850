//! Async Client
//!
//! A thin client for the two commands the server understands. Commands are
//! framed as RESP arrays; replies are not framed at all: a successful `GET`
//! answers with the raw value bytes and every other outcome is silence.
//! The client therefore reads one chunk per `GET` and treats a quiet
//! connection as "no reply".
//!
//! ## Example
//!
//! ```ignore
//! use loopkv::client::Client;
//!
//! let mut client = Client::connect("127.0.0.1:5001").await?;
//! client.set("name", "Ariz").await?;
//! let value = client.get("name").await?;
//! assert_eq!(&value[..], b"Ariz");
//! ```

use crate::protocol::RespValue;
use bytes::{Bytes, BytesMut};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};

/// How long `get` waits for a reply by default
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_millis(500);

/// Largest reply read in one go
const REPLY_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Nothing arrived in time: a miss, or a request the server rejected
    #[error("no reply within {0:?}")]
    NoReply(Duration),

    #[error("connection closed by server")]
    Closed,
}

pub struct Client {
    stream: TcpStream,
    buffer: BytesMut,
    reply_timeout: Duration,
}

impl Client {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;

        Ok(Self {
            stream,
            buffer: BytesMut::with_capacity(REPLY_BUFFER_SIZE),
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        })
    }

    pub fn with_reply_timeout(mut self, reply_timeout: Duration) -> Self {
        self.reply_timeout = reply_timeout;
        self
    }

    /// Sends `SET key value`. The server never answers a SET.
    pub async fn set(
        &mut self,
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> Result<(), ClientError> {
        let frame = RespValue::command([Bytes::from_static(b"SET"), key.into(), value.into()]);
        self.send_raw(&frame.serialize()).await
    }

    /// Sends `GET key` and returns the raw value.
    ///
    /// A missing key surfaces as [`ClientError::NoReply`].
    pub async fn get(&mut self, key: impl Into<Bytes>) -> Result<Bytes, ClientError> {
        let frame = RespValue::command([Bytes::from_static(b"GET"), key.into()]);
        self.send_raw(&frame.serialize()).await?;
        self.read_reply().await
    }

    /// Writes arbitrary bytes to the server.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), ClientError> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Closes the sending side. Replies already owed can still be read.
    pub async fn shutdown_write(&mut self) -> Result<(), ClientError> {
        self.stream.shutdown().await?;
        Ok(())
    }

    /// Reads whatever the server sends next, waiting at most the reply timeout.
    pub async fn read_reply(&mut self) -> Result<Bytes, ClientError> {
        self.buffer.clear();
        self.buffer.reserve(REPLY_BUFFER_SIZE);

        match tokio::time::timeout(self.reply_timeout, self.stream.read_buf(&mut self.buffer)).await
        {
            Err(_) => Err(ClientError::NoReply(self.reply_timeout)),
            Ok(Ok(0)) => Err(ClientError::Closed),
            Ok(Ok(_)) => Ok(self.buffer.split().freeze()),
            Ok(Err(e)) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_commands_are_resp_arrays() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let expected = b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n";
            let mut received = vec![0u8; expected.len()];
            socket.read_exact(&mut received).await.unwrap();
            assert_eq!(&received[..], &expected[..]);
            socket.write_all(b"bar").await.unwrap();
        });

        let mut client = Client::connect(addr).await.unwrap();
        client.set("foo", "bar").await.unwrap();
        assert_eq!(client.get("foo").await.unwrap(), Bytes::from("bar"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_silence_is_no_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            // Consume the request so closing sends FIN rather than RST.
            let mut request = [0u8; 64];
            let _ = socket.read(&mut request).await.unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
            drop(socket);
        });

        let mut client = Client::connect(addr)
            .await
            .unwrap()
            .with_reply_timeout(Duration::from_millis(50));
        assert!(matches!(
            client.get("missing").await,
            Err(ClientError::NoReply(_))
        ));

        server.await.unwrap();
        assert!(matches!(client.read_reply().await, Err(ClientError::Closed)));
    }
}
