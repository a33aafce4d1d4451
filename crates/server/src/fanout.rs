//! Local fanout to every connected client on this instance.
//!
//! Mirrors the update channel pattern used for subscriptions: a broadcast
//! sender that each connection's write loop subscribes to. Events emitted
//! here reach all sockets regardless of whether the peer has registered a
//! user id yet.

use tokio::sync::broadcast;

use crate::protocol::ServerEvent;

const FANOUT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct LocalFanout {
    tx: broadcast::Sender<ServerEvent>,
}

impl LocalFanout {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FANOUT_CAPACITY);
        Self { tx }
    }

    /// Emit to every connected client. Returns the number of connections that
    /// will observe the event; zero when nobody is connected.
    pub fn emit(&self, event: ServerEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.tx.subscribe()
    }
}

impl Default for LocalFanout {
    fn default() -> Self {
        Self::new()
    }
}
