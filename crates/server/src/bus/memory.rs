//! In-process loopback relay backend.
//!
//! Single-node stand-in for Redis pub/sub: publishes loop straight back to
//! this instance's own subscriber, which matches the Redis behavior of an
//! instance receiving its own envelopes. Tests also subscribe here to assert
//! what the router published.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::warn;

use crate::protocol::RelayEnvelope;
use crate::router::MessageRouter;

use super::{BusError, RelayBus};

const BUS_CAPACITY: usize = 256;

pub struct MemoryBus {
    tx: broadcast::Sender<RelayEnvelope>,
}

impl MemoryBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RelayEnvelope> {
        self.tx.subscribe()
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RelayBus for MemoryBus {
    async fn publish(&self, envelope: &RelayEnvelope) -> Result<(), BusError> {
        // Validate the payload even though it never leaves the process, so
        // both backends reject the same envelopes.
        envelope.payload()?;
        // No receiver just means nobody is listening yet, not a failure.
        let _ = self.tx.send(envelope.clone());
        Ok(())
    }
}

/// Counterpart of the Redis subscriber loop for single-node mode.
pub async fn run_memory_subscriber(
    mut rx: broadcast::Receiver<RelayEnvelope>,
    router: Arc<MessageRouter>,
) {
    loop {
        match rx.recv().await {
            Ok(envelope) => router.handle_relay(envelope).await,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Relay subscriber lagged, skipped {} envelopes", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
