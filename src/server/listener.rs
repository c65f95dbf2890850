//! Accept Loop
//!
//! Accepts clients and spawns one connection task per client. A failed
//! accept is never fatal: it is logged and retried after a delay that
//! doubles with every consecutive failure, so a persistent listener error
//! (file descriptor exhaustion, for instance) does not spin the CPU.

use crate::connection::{handle_connection, ConnectionContext, PeerId};
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, warn};

/// Exponential retry delay, capped.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            next: initial,
        }
    }

    /// Delay to wait now; the following one is twice as long, up to the cap.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.next.saturating_mul(2).min(self.max);
        delay
    }

    /// Back to the initial delay, after a success.
    pub fn reset(&mut self) {
        self.next = self.initial;
    }
}

pub struct AcceptLoop {
    listener: TcpListener,
    ctx: ConnectionContext,
    backoff: Backoff,
    next_id: PeerId,
}

impl AcceptLoop {
    pub fn new(listener: TcpListener, ctx: ConnectionContext, backoff: Backoff) -> Self {
        Self {
            listener,
            ctx,
            backoff,
            next_id: 1,
        }
    }

    /// Accepts until the shutdown signal fires.
    pub async fn run(mut self) {
        let mut shutdown = self.ctx.shutdown.clone();

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        self.backoff.reset();
                        let id = self.next_id;
                        self.next_id += 1;
                        debug!(peer = id, addr = %addr, "accepted connection");
                        tokio::spawn(handle_connection(stream, addr, id, self.ctx.clone()));
                    }
                    Err(e) => {
                        let delay = self.backoff.next_delay();
                        warn!(error = %e, retry_in = ?delay, "accept error");
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = shutdown.changed() => break,
                        }
                    }
                },
                _ = shutdown.changed() => break,
            }
        }

        debug!("accept loop stopped");
    }
}
