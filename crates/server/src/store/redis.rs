//! Redis-backed presence store.
//!
//! Records are `user_info:<id>` hashes with a 60s TTL (skipped for the
//! sentinel) mirrored into the `user_locations` GEO index. Keys are
//! enumerated with KEYS; the user population is small enough that a SCAN
//! cursor is not worth the extra round trips.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::geo::Coord;
use redis::AsyncCommands;
use tracing::warn;
use uuid::Uuid;

use crate::models::User;

use super::{
    registration_key, user_key, PresenceStore, StoreError, GEO_KEY, REGISTRATION_TTL_SECS,
    USER_KEY_PREFIX,
};

pub struct RedisPresenceStore {
    con: ConnectionManager,
    ttl: Duration,
}

impl RedisPresenceStore {
    pub fn new(con: ConnectionManager, ttl: Duration) -> Self {
        Self { con, ttl }
    }

    /// Parse one hash into a user. An entry with no id is corrupt and yields
    /// `None`; a missing coordinate only loses that field.
    fn parse_user(fields: &HashMap<String, String>) -> Option<User> {
        let id = fields.get("id").filter(|id| !id.is_empty())?;
        Some(User {
            id: id.clone(),
            name: fields.get("name").cloned().unwrap_or_default(),
            latitude: fields
                .get("latitude")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.0),
            longitude: fields
                .get("longitude")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.0),
        })
    }
}

#[async_trait]
impl PresenceStore for RedisPresenceStore {
    async fn upsert(&self, user: &User) -> Result<(), StoreError> {
        let key = user_key(&user.id);
        let mut con = self.con.clone();

        // Schema-drift repair: a key left behind with a non-hash type would
        // make HSET fail, so delete and recreate it.
        let key_type: String = redis::cmd("TYPE").arg(&key).query_async(&mut con).await?;
        if key_type != "hash" && key_type != "none" {
            warn!("Key {} has wrong type ({}), deleting", key, key_type);
            let _: () = con.del(&key).await?;
        }

        let _: () = redis::cmd("HSET")
            .arg(&key)
            .arg("id")
            .arg(&user.id)
            .arg("name")
            .arg(&user.name)
            .arg("latitude")
            .arg(user.latitude)
            .arg("longitude")
            .arg(user.longitude)
            .query_async(&mut con)
            .await?;

        if !user.is_sentinel() {
            let expired: Result<(), redis::RedisError> =
                con.expire(&key, self.ttl.as_secs() as i64).await;
            if let Err(e) = expired {
                warn!("Error setting TTL for {}: {}", key, e);
            }
        }

        let _: () = con
            .geo_add(
                GEO_KEY,
                (
                    Coord::lon_lat(user.longitude, user.latitude),
                    user.id.as_str(),
                ),
            )
            .await?;

        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<User>, StoreError> {
        let mut con = self.con.clone();
        let fields: HashMap<String, String> = con.hgetall(user_key(id)).await?;
        Ok(Self::parse_user(&fields))
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut con = self.con.clone();
        let _: () = con.del(user_key(id)).await?;
        let _: () = con.zrem(GEO_KEY, id).await?;
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<User>, StoreError> {
        let mut con = self.con.clone();
        let keys: Vec<String> = con.keys(format!("{}*", USER_KEY_PREFIX)).await?;

        let mut users = Vec::with_capacity(keys.len());
        for key in keys {
            let fields: Result<HashMap<String, String>, redis::RedisError> =
                con.hgetall(&key).await;
            match fields {
                Ok(fields) => {
                    if let Some(user) = Self::parse_user(&fields) {
                        users.push(user);
                    }
                }
                Err(e) => {
                    warn!("Error reading user data for key {}: {}", key, e);
                    continue;
                }
            }
        }
        Ok(users)
    }

    async fn remove_geo(&self, id: &str) -> Result<(), StoreError> {
        let mut con = self.con.clone();
        let _: () = con.zrem(GEO_KEY, id).await?;
        Ok(())
    }

    async fn wipe(&self) -> Result<(), StoreError> {
        let mut con = self.con.clone();
        let keys: Vec<String> = con.keys(format!("{}*", USER_KEY_PREFIX)).await?;
        if !keys.is_empty() {
            let deleted: i64 = con.del(&keys).await?;
            tracing::info!("Deleted {} presence keys", deleted);
        }
        let _: () = con.del(GEO_KEY).await?;
        Ok(())
    }

    async fn put_registration(
        &self,
        user_id: &str,
        connection_id: Uuid,
    ) -> Result<(), StoreError> {
        let body = serde_json::json!({
            "user_id": user_id,
            "connection_id": connection_id,
            "registered": chrono::Utc::now().timestamp(),
        });
        let mut con = self.con.clone();
        let _: () = con
            .set_ex(
                registration_key(user_id),
                body.to_string(),
                REGISTRATION_TTL_SECS,
            )
            .await?;
        Ok(())
    }
}
