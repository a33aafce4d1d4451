//! Cross-instance relay channel.
//!
//! Publish/subscribe transport that decouples instances: envelopes published
//! here fan out to every instance's subscriber loop, including the
//! publisher's own. Delivery is at-most-once per subscriber with no global
//! ordering across topics or publishers.
//!
//! Backends follow the presence store split: Redis pub/sub for clustering,
//! an in-process loopback for single-node mode and tests.

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use thiserror::Error;

use crate::protocol::{ProtocolError, RelayEnvelope};

pub use memory::{run_memory_subscriber, MemoryBus};
pub use redis::{run_redis_subscriber, RedisBus};

#[derive(Debug, Error)]
pub enum BusError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("encode error: {0}")]
    Encode(#[from] ProtocolError),
    #[error("channel closed")]
    Closed,
}

#[async_trait]
pub trait RelayBus: Send + Sync {
    /// Publish one envelope on its topic. Best-effort: a failed publish is an
    /// error for this operation only, never retried by the bus.
    async fn publish(&self, envelope: &RelayEnvelope) -> Result<(), BusError>;
}
