//! Per-instance connection registry.
//!
//! Maps a user id to the live connection that this instance owns. The map is
//! never shared across instances; whichever instance holds the physical
//! connection answers lookups for it. A single reader/writer lock guards the
//! map so concurrent lookups proceed together while registrations are
//! exclusive.

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use crate::protocol::ServerEvent;

/// Handle to one live client connection: an id for disconnect matching plus
/// the sender feeding that connection's write loop.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(tx: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queue an event for this connection. Returns false once the connection's
    /// write loop has gone away.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// user id -> connection handle, local to this instance.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    inner: RwLock<HashMap<String, ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the mapping for `user_id`. Last writer wins: a user
    /// re-registering from a new connection silently evicts the old mapping.
    pub fn register(&self, user_id: impl Into<String>, handle: ConnectionHandle) {
        let user_id = user_id.into();
        let previous = self.inner.write().insert(user_id.clone(), handle);
        if previous.is_some() {
            info!("User {} re-registered, previous connection evicted", user_id);
        }
    }

    pub fn lookup(&self, user_id: &str) -> Option<ConnectionHandle> {
        self.inner.read().get(user_id).cloned()
    }

    /// Remove the mapping for `user_id`, used when a globally expired user is
    /// purged. Idempotent.
    pub fn unregister(&self, user_id: &str) -> bool {
        self.inner.write().remove(user_id).is_some()
    }

    /// Remove whichever entry holds the closing connection. Linear scan; the
    /// map is bounded by concurrently connected clients on this instance.
    pub fn unregister_by_connection(&self, connection_id: Uuid) -> Option<String> {
        let mut map = self.inner.write();
        let user_id = map
            .iter()
            .find(|(_, handle)| handle.id() == connection_id)
            .map(|(user_id, _)| user_id.clone())?;
        map.remove(&user_id);
        Some(user_id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
