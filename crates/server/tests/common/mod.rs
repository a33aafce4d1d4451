//! Shared test harness: a router wired against the in-memory backends.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use server::bot::BotRelay;
use server::bus::MemoryBus;
use server::fanout::LocalFanout;
use server::protocol::ServerEvent;
use server::registry::{ConnectionHandle, ConnectionRegistry};
use server::router::MessageRouter;
use server::store::MemoryPresenceStore;

pub struct Harness {
    pub store: Arc<MemoryPresenceStore>,
    pub bus: Arc<MemoryBus>,
    pub registry: Arc<ConnectionRegistry>,
    pub fanout: LocalFanout,
    pub router: Arc<MessageRouter>,
}

pub fn harness() -> Harness {
    harness_with(Duration::from_secs(60), None)
}

pub fn harness_with(ttl: Duration, bot: Option<Arc<BotRelay>>) -> Harness {
    let store = Arc::new(MemoryPresenceStore::new(ttl));
    let bus = Arc::new(MemoryBus::new());
    let registry = Arc::new(ConnectionRegistry::new());
    let fanout = LocalFanout::new();
    let router = Arc::new(MessageRouter::new(
        store.clone(),
        bus.clone(),
        registry.clone(),
        fanout.clone(),
        bot,
    ));
    Harness {
        store,
        bus,
        registry,
        fanout,
        router,
    }
}

/// A fake client connection: handle plus the receiver its events land on.
pub fn connection() -> (ConnectionHandle, mpsc::UnboundedReceiver<ServerEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ConnectionHandle::new(tx), rx)
}
