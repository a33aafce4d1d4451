use serde::{Deserialize, Serialize};

/// Reserved id of the virtual bot participant. Its presence entry never
/// expires and private messages addressed to it go to the external bot API
/// instead of a connection.
pub const SENTINEL_USER_ID: &str = "HIGMA";

/// Fixed position the sentinel user is registered at on startup.
pub const SENTINEL_LATITUDE: f64 = 34.764_246_2;
pub const SENTINEL_LONGITUDE: f64 = 137.387_570_6;

/// A user's identity and last-known location.
///
/// This is the presence record shared across instances: stored as a hash
/// `user_info:<id>` plus a member of the `user_locations` GEO index, and
/// carried verbatim in `user_added` / `user_updated` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
}

impl User {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            latitude,
            longitude,
        }
    }

    /// The sentinel user at its fixed position.
    pub fn sentinel() -> Self {
        Self::new(
            SENTINEL_USER_ID,
            SENTINEL_USER_ID,
            SENTINEL_LATITUDE,
            SENTINEL_LONGITUDE,
        )
    }

    pub fn is_sentinel(&self) -> bool {
        self.id == SENTINEL_USER_ID
    }
}

/// Broadcast vs. directed chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Broadcast,
    Private,
}

/// A chat message as it travels between clients and instances.
///
/// `kind` and `to` are absent on inbound broadcast traffic; the router stamps
/// `kind` before a message is delivered or published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ChatKind>,
    pub from: String,
    pub from_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    pub message: String,
    #[serde(default)]
    pub timestamp: String,
}

impl ChatMessage {
    /// Mark as a broadcast message.
    pub fn into_broadcast(mut self) -> Self {
        self.kind = Some(ChatKind::Broadcast);
        self.to = None;
        self
    }

    /// Mark as a private message.
    pub fn into_private(mut self) -> Self {
        self.kind = Some(ChatKind::Private);
        self
    }
}
