//! Presence expiry reconciler.
//!
//! The store's own TTL silently removes stale records; nothing signals that
//! removal. This loop exists to notice it: every tick it lists the current
//! presence ids, diffs them against the previous snapshot, and propagates a
//! deletion for every id that disappeared - GEO index cleanup, a
//! `user:deleted` envelope for the other instances, a `user_deleted` event
//! for local clients, and a purge of any local connection mapping.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::bus::RelayBus;
use crate::fanout::LocalFanout;
use crate::models::SENTINEL_USER_ID;
use crate::protocol::{RelayEnvelope, ServerEvent};
use crate::registry::ConnectionRegistry;
use crate::store::PresenceStore;

/// Ids present in the previous snapshot but gone now. The sentinel is never
/// reported, whatever the snapshots say.
pub fn expired_ids(previous: &HashSet<String>, current: &HashSet<String>) -> Vec<String> {
    previous
        .difference(current)
        .filter(|id| id.as_str() != SENTINEL_USER_ID)
        .cloned()
        .collect()
}

pub struct ExpiryReconciler {
    store: Arc<dyn PresenceStore>,
    bus: Arc<dyn RelayBus>,
    registry: Arc<ConnectionRegistry>,
    fanout: LocalFanout,
    interval: Duration,
}

impl ExpiryReconciler {
    pub fn new(
        store: Arc<dyn PresenceStore>,
        bus: Arc<dyn RelayBus>,
        registry: Arc<ConnectionRegistry>,
        fanout: LocalFanout,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            bus,
            registry,
            fanout,
            interval,
        }
    }

    /// Runs for the lifetime of the process.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.interval);
        let mut snapshot = HashSet::new();
        loop {
            ticker.tick().await;
            snapshot = self.tick(snapshot).await;
        }
    }

    /// One reconciliation pass. Returns the snapshot to carry into the next
    /// tick; on a failed listing the old snapshot is kept unchanged so a
    /// transient store error is never read as "everyone expired".
    pub async fn tick(&self, previous: HashSet<String>) -> HashSet<String> {
        let users = match self.store.list_all().await {
            Ok(users) => users,
            Err(e) => {
                warn!("Skipping reconciliation tick, listing failed: {}", e);
                return previous;
            }
        };

        let current: HashSet<String> = users.into_iter().map(|user| user.id).collect();
        debug!("Current users in store: {}", current.len());

        for id in expired_ids(&previous, &current) {
            info!("User {} expired (no update within TTL)", id);

            // The TTL may have removed only the record; drop the index member
            // too so the GEO side converges.
            if let Err(e) = self.store.remove_geo(&id).await {
                warn!("Failed to remove {} from GEO index: {}", id, e);
            }

            let envelope = RelayEnvelope::UserDeleted { id: id.clone() };
            if let Err(e) = self.bus.publish(&envelope).await {
                warn!("Failed to publish deletion of {}: {}", id, e);
            }

            self.fanout.emit(ServerEvent::UserDeleted { id: id.clone() });
            self.registry.unregister(&id);
        }

        current
    }
}
