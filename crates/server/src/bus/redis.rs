//! Redis pub/sub relay backend.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{info, warn};

use crate::protocol::{topics, RelayEnvelope};
use crate::router::MessageRouter;

use super::{BusError, RelayBus};

pub struct RedisBus {
    con: ConnectionManager,
}

impl RedisBus {
    pub fn new(con: ConnectionManager) -> Self {
        Self { con }
    }
}

#[async_trait]
impl RelayBus for RedisBus {
    async fn publish(&self, envelope: &RelayEnvelope) -> Result<(), BusError> {
        let payload = envelope.payload()?;
        let mut con = self.con.clone();
        let _: () = con.publish(envelope.topic(), payload).await?;
        Ok(())
    }
}

/// Blocking receive loop for the relay topics. One task per instance for the
/// lifetime of the process; each received payload is decoded and dispatched
/// through the router, and anything that fails to parse into a known
/// envelope is logged and dropped.
pub async fn run_redis_subscriber(
    client: redis::Client,
    router: Arc<MessageRouter>,
) -> anyhow::Result<()> {
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.subscribe(&topics::ALL[..]).await?;
    info!("Subscribed to relay topics: {:?}", topics::ALL);

    let mut stream = pubsub.on_message();
    while let Some(msg) = stream.next().await {
        let topic = msg.get_channel_name().to_string();
        let payload: String = match msg.get_payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Dropping non-text payload on {}: {}", topic, e);
                continue;
            }
        };

        match RelayEnvelope::decode(&topic, &payload) {
            Ok(envelope) => router.handle_relay(envelope).await,
            Err(e) => warn!("Dropping relay message: {}", e),
        }
    }

    warn!("Relay subscription stream ended");
    Ok(())
}
