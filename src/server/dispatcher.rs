//! Dispatcher Event Loop
//!
//! The dispatcher is the single owner of all mutable server state: the
//! peer registry and the store. Every other task talks to it through the
//! channels behind a [`DispatcherHandle`].
//!
//! ```text
//!   Connection ──register/deregister──┐
//!   Connection ──Message──┐           │
//!   Connection ──Message──┤           │
//!                         ▼           ▼
//!                 ┌────────────────────────┐      shutdown (watch)
//!                 │       Dispatcher       │<──────────────────
//!                 │  peers: PeerId -> Peer │
//!                 │  store: impl Store     │
//!                 └───────────┬────────────┘
//!                             │ GET hit
//!                             ▼
//!                    origin Peer's socket
//! ```
//!
//! Events are taken in arrival order from whichever source is ready, with no
//! priority between sources. The one exception is deregistration: messages
//! already queued when it arrives are handled first, since a connection
//! queues its last message before it deregisters. Because only this loop
//! mutates the registry and the store, there are no locks around either.

use crate::commands::{Command, CommandDecoder, ProtocolError};
use crate::connection::{Peer, PeerId};
use crate::storage::Store;
use bytes::Bytes;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, trace, warn};

/// One read event from a connection: the bytes received and who sent them.
#[derive(Debug, Clone)]
pub struct Message {
    pub payload: Bytes,
    pub origin: PeerId,
}

impl Message {
    pub fn new(origin: PeerId, payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            origin,
        }
    }
}

/// Changes to the peer registry.
#[derive(Debug)]
pub enum PeerEvent {
    /// Add a peer. `ack` fires once the peer is in the registry.
    Register {
        peer: Peer,
        ack: oneshot::Sender<()>,
    },
    /// Remove a peer whose read loop has ended.
    Deregister { id: PeerId },
}

/// The dispatcher task has stopped and its channels are closed.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("dispatcher is no longer running")]
pub struct DispatcherClosed;

/// Cloneable sending side of the dispatcher's channels.
#[derive(Debug, Clone)]
pub struct DispatcherHandle {
    messages: mpsc::Sender<Message>,
    events: mpsc::Sender<PeerEvent>,
}

impl DispatcherHandle {
    /// Registers a peer and waits until the dispatcher has processed it.
    ///
    /// Once this returns, the peer is visible to the dispatcher before any
    /// message sent afterwards.
    pub async fn register(&self, peer: Peer) -> Result<(), DispatcherClosed> {
        let (ack, registered) = oneshot::channel();
        self.events
            .send(PeerEvent::Register { peer, ack })
            .await
            .map_err(|_| DispatcherClosed)?;
        registered.await.map_err(|_| DispatcherClosed)
    }

    /// Asks the dispatcher to drop a peer from its registry.
    pub async fn deregister(&self, id: PeerId) -> Result<(), DispatcherClosed> {
        self.events
            .send(PeerEvent::Deregister { id })
            .await
            .map_err(|_| DispatcherClosed)
    }

    /// Queues a message, waiting while the inbound channel is full.
    pub async fn deliver(&self, message: Message) -> Result<(), DispatcherClosed> {
        self.messages
            .send(message)
            .await
            .map_err(|_| DispatcherClosed)
    }
}

/// Tunables for the dispatcher.
#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    /// Bound of the inbound message channel and of the registration channel
    pub channel_capacity: usize,
    /// Execute every command in a message instead of only the first
    pub pipelining: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 32,
            pipelining: false,
        }
    }
}

/// Counters kept by the dispatcher over its lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub peers_registered: u64,
    pub peers_deregistered: u64,
    pub messages: u64,
    pub commands_applied: u64,
    pub protocol_errors: u64,
    pub store_errors: u64,
    pub misses: u64,
    pub replies_sent: u64,
}

/// What is left once the dispatcher stops.
#[derive(Debug)]
pub struct DispatchReport<S> {
    pub store: S,
    pub stats: DispatchStats,
    /// Peers still registered when the loop ended
    pub live_peers: usize,
}

/// The event loop. Build one with [`channel`] and drive it with [`Dispatcher::run`].
pub struct Dispatcher<S> {
    store: S,
    peers: HashMap<PeerId, Peer>,
    messages: mpsc::Receiver<Message>,
    events: mpsc::Receiver<PeerEvent>,
    shutdown: watch::Receiver<bool>,
    pipelining: bool,
    stats: DispatchStats,
}

/// Creates a dispatcher owning `store`, and the handle used to reach it.
///
/// The loop ends when `shutdown` flips (or its sender is dropped), or when
/// every handle has been dropped and both channels are drained.
pub fn channel<S: Store>(
    store: S,
    config: DispatcherConfig,
    shutdown: watch::Receiver<bool>,
) -> (Dispatcher<S>, DispatcherHandle) {
    let capacity = config.channel_capacity.max(1);
    let (message_tx, message_rx) = mpsc::channel(capacity);
    let (event_tx, event_rx) = mpsc::channel(capacity);

    let dispatcher = Dispatcher {
        store,
        peers: HashMap::new(),
        messages: message_rx,
        events: event_rx,
        shutdown,
        pipelining: config.pipelining,
        stats: DispatchStats::default(),
    };
    let handle = DispatcherHandle {
        messages: message_tx,
        events: event_tx,
    };

    (dispatcher, handle)
}

impl<S: Store> Dispatcher<S> {
    /// Runs the loop until shutdown and returns the final state.
    pub async fn run(mut self) -> DispatchReport<S> {
        debug!(pipelining = self.pipelining, "dispatcher started");

        let mut messages_open = true;
        let mut events_open = true;

        while (messages_open || events_open) && !*self.shutdown.borrow_and_update() {
            tokio::select! {
                message = self.messages.recv(), if messages_open => match message {
                    Some(message) => self.handle_message(message).await,
                    None => messages_open = false,
                },
                event = self.events.recv(), if events_open => match event {
                    Some(event) => self.handle_event(event).await,
                    None => events_open = false,
                },
                _ = self.shutdown.changed() => {
                    debug!("dispatcher received shutdown signal");
                    break;
                }
            }
        }

        info!(
            peers = self.peers.len(),
            keys = self.store.len(),
            messages = self.stats.messages,
            commands = self.stats.commands_applied,
            protocol_errors = self.stats.protocol_errors,
            "dispatcher stopped"
        );

        DispatchReport {
            live_peers: self.peers.len(),
            store: self.store,
            stats: self.stats,
        }
    }

    async fn handle_event(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::Register { peer, ack } => {
                info!(peer = peer.id(), addr = %peer.addr(), "peer registered");
                self.peers.insert(peer.id(), peer);
                self.stats.peers_registered += 1;
                // The registering task may have given up already; nothing to undo.
                let _ = ack.send(());
            }
            PeerEvent::Deregister { id } => {
                self.drain_queued_messages().await;
                if let Some(peer) = self.peers.remove(&id) {
                    info!(peer = id, addr = %peer.addr(), "peer deregistered");
                    self.stats.peers_deregistered += 1;
                }
            }
        }
    }

    /// Handles the messages queued right now, not ones arriving meanwhile.
    async fn drain_queued_messages(&mut self) {
        let queued = self.messages.len();
        for _ in 0..queued {
            match self.messages.try_recv() {
                Ok(message) => self.handle_message(message).await,
                Err(_) => break,
            }
        }
    }

    async fn handle_message(&mut self, message: Message) {
        self.stats.messages += 1;
        trace!(
            peer = message.origin,
            bytes = message.payload.len(),
            "received message"
        );

        let Message { payload, origin } = message;
        let mut decoder = CommandDecoder::new(payload);

        if !self.pipelining {
            let decoded = decoder.next().unwrap_or(Err(ProtocolError::UnknownCommand));
            self.apply(origin, decoded).await;
            return;
        }

        let mut decoded_any = false;
        for decoded in decoder {
            decoded_any = true;
            self.apply(origin, decoded).await;
        }
        if !decoded_any {
            self.apply(origin, Err(ProtocolError::UnknownCommand)).await;
        }
    }

    async fn apply(&mut self, origin: PeerId, decoded: Result<Command, ProtocolError>) {
        let command = match decoded {
            Ok(command) => command,
            Err(e) => {
                self.stats.protocol_errors += 1;
                warn!(peer = origin, error = %e, "protocol error");
                return;
            }
        };

        match command {
            Command::Set { key, value } => match self.store.set(key, value) {
                Ok(()) => self.stats.commands_applied += 1,
                Err(e) => {
                    self.stats.store_errors += 1;
                    error!(peer = origin, error = %e, "store error");
                }
            },
            Command::Get { key } => {
                let Some(value) = self.store.get(&key) else {
                    self.stats.misses += 1;
                    warn!(
                        peer = origin,
                        key = %String::from_utf8_lossy(&key),
                        "key not found"
                    );
                    return;
                };
                self.stats.commands_applied += 1;
                self.reply(origin, &value).await;
            }
        }
    }

    async fn reply(&mut self, origin: PeerId, data: &[u8]) {
        let Some(peer) = self.peers.get_mut(&origin) else {
            warn!(peer = origin, "reply target is no longer registered");
            return;
        };

        match peer.send(data).await {
            Ok(written) => {
                self.stats.replies_sent += 1;
                trace!(peer = origin, bytes = written, "sent reply");
            }
            Err(e) => {
                error!(peer = origin, addr = %peer.addr(), error = %e, "peer send error");
            }
        }
    }
}
