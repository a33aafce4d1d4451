//! Adapter to the external conversational bot API.
//!
//! The sentinel user is backed by an HTTP endpoint: private messages
//! addressed to it become `{sender, query}` requests, and a response
//! containing an `answer` string is delivered back to the originating
//! connection as a private chat message from the sentinel. Every failure is
//! terminal for that single request: logged, dropped, nothing surfaced to
//! the sender.

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::{ChatKind, ChatMessage, SENTINEL_USER_ID};
use crate::registry::ConnectionHandle;
use crate::protocol::ServerEvent;

#[derive(Debug, Error)]
pub enum BotError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("response has no `answer` field")]
    MissingAnswer,
}

#[derive(Serialize)]
struct BotQuery<'a> {
    sender: &'a str,
    query: &'a str,
}

pub struct BotRelay {
    endpoint: String,
    client: reqwest::Client,
}

impl BotRelay {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }

    /// One synchronous question/answer exchange with the bot API.
    pub async fn ask(&self, sender: &str, query: &str) -> Result<String, BotError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&BotQuery { sender, query })
            .send()
            .await?;

        info!(
            "Bot API called for message from {} (status: {})",
            sender,
            response.status()
        );

        let body: serde_json::Value = response.json().await?;
        match body.get("answer").and_then(|answer| answer.as_str()) {
            Some(answer) => Ok(answer.to_string()),
            None => Err(BotError::MissingAnswer),
        }
    }

    /// Ask the bot and deliver its reply straight back to the sender's
    /// connection. Failures are logged and the request is dropped; the
    /// sender sees nothing but silence.
    pub async fn relay(&self, handle: &ConnectionHandle, from: &str, message: &str) {
        let answer = match self.ask(from, message).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Bot request from {} failed: {}", from, e);
                return;
            }
        };

        let reply = ChatMessage {
            kind: Some(ChatKind::Private),
            from: SENTINEL_USER_ID.to_string(),
            from_name: SENTINEL_USER_ID.to_string(),
            to: Some(from.to_string()),
            message: answer,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        if handle.send(ServerEvent::ChatMessage(reply)) {
            info!("Bot reply sent to {}", from);
        } else {
            warn!("Bot reply for {} dropped, connection gone", from);
        }
    }
}
