//! Wire protocol: relay envelopes shared between instances and the JSON
//! events exchanged with connected clients.
//!
//! Relay envelopes are self-contained JSON bodies; the pub/sub topic name is
//! the discriminator on the wire, so each topic carries exactly one payload
//! shape. Client traffic is framed as `{"event": ..., "data": ...}`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{ChatMessage, User};

/// Pub/sub topics used for cross-instance fanout.
pub mod topics {
    pub const USER_LOCATION: &str = "user:location";
    pub const CHAT_BROADCAST: &str = "chat:broadcast";
    pub const CHAT_PRIVATE: &str = "chat:private";
    pub const USER_DELETED: &str = "user:deleted";

    /// All topics an instance subscribes to.
    pub const ALL: [&str; 4] = [USER_LOCATION, CHAT_BROADCAST, CHAT_PRIVATE, USER_DELETED];
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown relay topic: {0}")]
    UnknownTopic(String),
    #[error("bad payload on {topic}: {source}")]
    BadPayload {
        topic: String,
        source: serde_json::Error,
    },
    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A message published on the cross-instance channel.
///
/// Every variant maps to exactly one topic and carries no routing metadata
/// beyond its own fields; recipients are re-derived from local registry state
/// on each subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEnvelope {
    LocationUpdate(User),
    ChatBroadcast(ChatMessage),
    ChatPrivate(ChatMessage),
    UserDeleted { id: String },
}

#[derive(Debug, Serialize, Deserialize)]
struct DeletedBody {
    id: String,
}

impl RelayEnvelope {
    pub fn topic(&self) -> &'static str {
        match self {
            RelayEnvelope::LocationUpdate(_) => topics::USER_LOCATION,
            RelayEnvelope::ChatBroadcast(_) => topics::CHAT_BROADCAST,
            RelayEnvelope::ChatPrivate(_) => topics::CHAT_PRIVATE,
            RelayEnvelope::UserDeleted { .. } => topics::USER_DELETED,
        }
    }

    /// Serialize the payload published on `self.topic()`.
    pub fn payload(&self) -> Result<String, ProtocolError> {
        let payload = match self {
            RelayEnvelope::LocationUpdate(user) => serde_json::to_string(user)?,
            RelayEnvelope::ChatBroadcast(msg) => serde_json::to_string(msg)?,
            RelayEnvelope::ChatPrivate(msg) => serde_json::to_string(msg)?,
            RelayEnvelope::UserDeleted { id } => {
                serde_json::to_string(&DeletedBody { id: id.clone() })?
            }
        };
        Ok(payload)
    }

    /// Decode a payload received on `topic`.
    pub fn decode(topic: &str, payload: &str) -> Result<Self, ProtocolError> {
        let bad = |source| ProtocolError::BadPayload {
            topic: topic.to_string(),
            source,
        };
        match topic {
            topics::USER_LOCATION => serde_json::from_str(payload)
                .map(RelayEnvelope::LocationUpdate)
                .map_err(bad),
            topics::CHAT_BROADCAST => serde_json::from_str(payload)
                .map(RelayEnvelope::ChatBroadcast)
                .map_err(bad),
            topics::CHAT_PRIVATE => serde_json::from_str(payload)
                .map(RelayEnvelope::ChatPrivate)
                .map_err(bad),
            topics::USER_DELETED => serde_json::from_str(payload)
                .map(|body: DeletedBody| RelayEnvelope::UserDeleted { id: body.id })
                .map_err(bad),
            other => Err(ProtocolError::UnknownTopic(other.to_string())),
        }
    }
}

/// Event received from a connected client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    Register { user_id: String },
    Location(User),
    ChatBroadcast(ChatMessage),
    ChatPrivate(ChatMessage),
}

/// Event emitted to a connected client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    AllUsers(Vec<User>),
    UserAdded(User),
    UserUpdated(User),
    UserDeleted { id: String },
    RegisterAck { status: String, user_id: String },
    LocationAck { status: String },
    ChatMessage(ChatMessage),
    ChatError { error: String, user_id: String },
}

impl ServerEvent {
    pub fn register_ack(user_id: impl Into<String>) -> Self {
        ServerEvent::RegisterAck {
            status: "ok".to_string(),
            user_id: user_id.into(),
        }
    }

    pub fn location_ack() -> Self {
        ServerEvent::LocationAck {
            status: "ok".to_string(),
        }
    }

    pub fn user_not_connected(user_id: impl Into<String>) -> Self {
        ServerEvent::ChatError {
            error: "User not connected".to_string(),
            user_id: user_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChatKind;

    #[test]
    fn envelope_round_trips_per_topic() {
        let envelopes = [
            RelayEnvelope::LocationUpdate(User::new("alice", "Alice", 35.0, 139.0)),
            RelayEnvelope::ChatBroadcast(ChatMessage {
                kind: Some(ChatKind::Broadcast),
                from: "bob".into(),
                from_name: "Bob".into(),
                to: None,
                message: "hello all".into(),
                timestamp: "2024-01-01T00:00:00Z".into(),
            }),
            RelayEnvelope::ChatPrivate(ChatMessage {
                kind: Some(ChatKind::Private),
                from: "bob".into(),
                from_name: "Bob".into(),
                to: Some("alice".into()),
                message: "hi".into(),
                timestamp: "2024-01-01T00:00:00Z".into(),
            }),
            RelayEnvelope::UserDeleted { id: "alice".into() },
        ];

        for envelope in envelopes {
            let payload = envelope.payload().unwrap();
            let decoded = RelayEnvelope::decode(envelope.topic(), &payload).unwrap();
            assert_eq!(decoded, envelope);
        }
    }

    #[test]
    fn decode_rejects_unknown_topic_and_bad_payload() {
        assert!(matches!(
            RelayEnvelope::decode("user:unknown", "{}"),
            Err(ProtocolError::UnknownTopic(_))
        ));
        assert!(matches!(
            RelayEnvelope::decode(topics::USER_LOCATION, "not json"),
            Err(ProtocolError::BadPayload { .. })
        ));
    }

    #[test]
    fn client_events_parse_from_documented_frames() {
        let register: ClientEvent =
            serde_json::from_str(r#"{"event":"register","data":{"user_id":"alice"}}"#).unwrap();
        assert_eq!(
            register,
            ClientEvent::Register {
                user_id: "alice".into()
            }
        );

        let location: ClientEvent = serde_json::from_str(
            r#"{"event":"location","data":{"id":"alice","name":"Alice","latitude":35.0,"longitude":139.0}}"#,
        )
        .unwrap();
        assert_eq!(
            location,
            ClientEvent::Location(User::new("alice", "Alice", 35.0, 139.0))
        );

        let private: ClientEvent = serde_json::from_str(
            r#"{"event":"chat_private","data":{"from":"bob","from_name":"Bob","to":"HIGMA","message":"hi","timestamp":"t"}}"#,
        )
        .unwrap();
        match private {
            ClientEvent::ChatPrivate(msg) => {
                assert_eq!(msg.to.as_deref(), Some("HIGMA"));
                assert_eq!(msg.kind, None);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn server_event_json_shape() {
        let ack = serde_json::to_value(ServerEvent::register_ack("alice")).unwrap();
        assert_eq!(ack["event"], "register_ack");
        assert_eq!(ack["data"]["status"], "ok");
        assert_eq!(ack["data"]["user_id"], "alice");

        let msg = serde_json::to_value(ServerEvent::ChatMessage(ChatMessage {
            kind: Some(ChatKind::Private),
            from: "HIGMA".into(),
            from_name: "HIGMA".into(),
            to: Some("bob".into()),
            message: "hello".into(),
            timestamp: "t".into(),
        }))
        .unwrap();
        assert_eq!(msg["event"], "chat_message");
        assert_eq!(msg["data"]["type"], "private");
        assert_eq!(msg["data"]["to"], "bob");
    }
}
