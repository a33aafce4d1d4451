//! In-memory presence store.
//!
//! Single-node backend: keeps presence on this instance only, with the same
//! record/GEO split and TTL behavior as the Redis store so the reconciler and
//! router behave identically against it. Expiry is evaluated lazily on read,
//! which is when the Redis TTL removal would become observable too.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::models::User;

use super::{PresenceStore, StoreError};

struct Entry {
    user: User,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

#[derive(Default)]
struct Inner {
    records: HashMap<String, Entry>,
    geo_members: HashSet<String>,
    registrations: HashMap<String, String>,
}

pub struct MemoryPresenceStore {
    inner: Mutex<Inner>,
    ttl: Duration,
}

impl MemoryPresenceStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            ttl,
        }
    }

    /// Current GEO index membership, for divergence checks in tests.
    pub fn geo_members(&self) -> HashSet<String> {
        self.inner.lock().geo_members.clone()
    }

    fn prune(inner: &mut Inner) {
        // Mirrors Redis TTL semantics: only the record goes away, the GEO
        // member stays until someone removes it explicitly.
        let now = Instant::now();
        inner.records.retain(|_, entry| !entry.is_expired(now));
    }
}

#[async_trait]
impl PresenceStore for MemoryPresenceStore {
    async fn upsert(&self, user: &User) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let expires_at = if user.is_sentinel() {
            None
        } else {
            Some(Instant::now() + self.ttl)
        };
        inner.records.insert(
            user.id.clone(),
            Entry {
                user: user.clone(),
                expires_at,
            },
        );
        inner.geo_members.insert(user.id.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<User>, StoreError> {
        let mut inner = self.inner.lock();
        Self::prune(&mut inner);
        Ok(inner.records.get(id).map(|entry| entry.user.clone()))
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.records.remove(id);
        inner.geo_members.remove(id);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<User>, StoreError> {
        let mut inner = self.inner.lock();
        Self::prune(&mut inner);
        Ok(inner
            .records
            .values()
            .map(|entry| entry.user.clone())
            .collect())
    }

    async fn remove_geo(&self, id: &str) -> Result<(), StoreError> {
        self.inner.lock().geo_members.remove(id);
        Ok(())
    }

    async fn wipe(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.records.clear();
        inner.geo_members.clear();
        Ok(())
    }

    async fn put_registration(
        &self,
        user_id: &str,
        connection_id: Uuid,
    ) -> Result<(), StoreError> {
        self.inner
            .lock()
            .registrations
            .insert(user_id.to_string(), connection_id.to_string());
        Ok(())
    }
}
