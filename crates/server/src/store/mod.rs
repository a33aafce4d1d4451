//! Shared presence store.
//!
//! Source of truth for who is online and where. Each record lives as a
//! `user_info:<id>` hash plus a member of the `user_locations` GEO index;
//! the two are written in separate steps, so transient divergence between
//! them is tolerated and self-heals on the next full upsert or reconciler
//! tick. Every record except the sentinel carries a liveness TTL and is
//! removed by the store itself when it is not refreshed.
//!
//! Two backends: Redis for real multi-instance deployments, and an in-memory
//! store for single-node mode and tests.

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::User;

pub use memory::MemoryPresenceStore;
pub use redis::RedisPresenceStore;

/// Redis key of the shared geospatial index.
pub const GEO_KEY: &str = "user_locations";

pub(crate) const USER_KEY_PREFIX: &str = "user_info:";
pub(crate) const REGISTRATION_KEY_PREFIX: &str = "user:registration:";

/// TTL applied to registration breadcrumbs, in seconds.
pub(crate) const REGISTRATION_TTL_SECS: u64 = 300;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Operations every presence backend provides.
///
/// All reads are best-effort: a record missing a coordinate field is returned
/// with that field defaulted rather than dropped, and a record with no id is
/// skipped as corrupt. All writes are idempotent.
#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Write the record and refresh its TTL (sentinel records get no TTL),
    /// then mirror it into the GEO index. Two non-atomic steps.
    async fn upsert(&self, user: &User) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Option<User>, StoreError>;

    /// Remove both the record and its GEO member. Partial deletion is
    /// possible and safe to retry.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    async fn list_all(&self) -> Result<Vec<User>, StoreError>;

    /// Remove only the GEO member. The reconciler uses this to clean up after
    /// a TTL removed the hash but left the index entry behind.
    async fn remove_geo(&self, id: &str) -> Result<(), StoreError>;

    /// Delete every presence record and the GEO index. Run once at startup so
    /// the instance begins from a clean shared state.
    async fn wipe(&self) -> Result<(), StoreError>;

    /// Diagnostic breadcrumb written on register; short-lived, never read by
    /// the server.
    async fn put_registration(&self, user_id: &str, connection_id: Uuid)
        -> Result<(), StoreError>;
}

pub(crate) fn user_key(id: &str) -> String {
    format!("{}{}", USER_KEY_PREFIX, id)
}

pub(crate) fn registration_key(user_id: &str) -> String {
    format!("{}{}", REGISTRATION_KEY_PREFIX, user_id)
}
