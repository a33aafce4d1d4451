//! Message router.
//!
//! Decides, per inbound event, whether a message is handled locally,
//! published for another instance, or forwarded to the bot relay. The same
//! router also dispatches envelopes arriving from the cross-instance channel
//! back onto local connections.
//!
//! Delivery policy:
//! - Location updates are written to the store, delivered locally and
//!   published. The origin instance re-receives its own envelope from the
//!   channel; clients tolerate the duplicate `user_updated`.
//! - Broadcast chat is only ever published; local delivery happens when this
//!   instance's own subscriber receives the envelope, so nobody sees it
//!   twice.
//! - Private chat prefers a local delivery (no publish round trip) and falls
//!   back to publishing for whichever instance holds the recipient.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::bot::BotRelay;
use crate::bus::RelayBus;
use crate::fanout::LocalFanout;
use crate::models::{ChatMessage, User, SENTINEL_USER_ID};
use crate::protocol::{ClientEvent, RelayEnvelope, ServerEvent};
use crate::registry::{ConnectionHandle, ConnectionRegistry};
use crate::store::PresenceStore;

pub struct MessageRouter {
    store: Arc<dyn PresenceStore>,
    bus: Arc<dyn RelayBus>,
    registry: Arc<ConnectionRegistry>,
    fanout: LocalFanout,
    bot: Option<Arc<BotRelay>>,
}

impl MessageRouter {
    pub fn new(
        store: Arc<dyn PresenceStore>,
        bus: Arc<dyn RelayBus>,
        registry: Arc<ConnectionRegistry>,
        fanout: LocalFanout,
        bot: Option<Arc<BotRelay>>,
    ) -> Self {
        Self {
            store,
            bus,
            registry,
            fanout,
            bot,
        }
    }

    /// Dispatch one event read from a client connection.
    pub async fn handle_client_event(&self, handle: &ConnectionHandle, event: ClientEvent) {
        match event {
            ClientEvent::Register { user_id } => self.handle_register(handle, user_id).await,
            ClientEvent::Location(user) => self.handle_location(handle, user).await,
            ClientEvent::ChatBroadcast(msg) => self.handle_chat_broadcast(msg).await,
            ClientEvent::ChatPrivate(msg) => self.handle_chat_private(handle, msg).await,
        }
    }

    /// The closing connection's registry entry is purged; presence is left
    /// alone and continues until its TTL expires or someone deletes it.
    pub fn handle_disconnect(&self, connection_id: Uuid) {
        if let Some(user_id) = self.registry.unregister_by_connection(connection_id) {
            info!("Removed user {} from registry", user_id);
        }
    }

    async fn handle_register(&self, handle: &ConnectionHandle, user_id: String) {
        self.registry.register(user_id.clone(), handle.clone());
        info!("User registered: {} (connection: {})", user_id, handle.id());

        // Diagnostic breadcrumb; registration succeeds regardless.
        if let Err(e) = self.store.put_registration(&user_id, handle.id()).await {
            warn!("Failed to record registration for {}: {}", user_id, e);
        }

        handle.send(ServerEvent::register_ack(user_id));
    }

    async fn handle_location(&self, handle: &ConnectionHandle, user: User) {
        if user.id.is_empty() {
            warn!("Dropping location update without id");
            return;
        }

        if let Err(e) = self.store.upsert(&user).await {
            warn!("Error storing location for {}: {}", user.id, e);
            return;
        }
        info!(
            "Location saved: {} ({}) at ({}, {})",
            user.name, user.id, user.latitude, user.longitude
        );

        let envelope = RelayEnvelope::LocationUpdate(user.clone());
        if let Err(e) = self.bus.publish(&envelope).await {
            warn!("Failed to publish location of {}: {}", user.id, e);
        }

        self.fanout.emit(ServerEvent::UserUpdated(user));
        handle.send(ServerEvent::location_ack());
    }

    async fn handle_chat_broadcast(&self, msg: ChatMessage) {
        info!("Chat broadcast from {} ({})", msg.from_name, msg.from);
        let envelope = RelayEnvelope::ChatBroadcast(msg.into_broadcast());
        if let Err(e) = self.bus.publish(&envelope).await {
            warn!("Failed to publish broadcast: {}", e);
        }
    }

    async fn handle_chat_private(&self, handle: &ConnectionHandle, msg: ChatMessage) {
        let Some(to) = msg.to.clone().filter(|to| !to.is_empty()) else {
            warn!("Dropping private chat from {} without recipient", msg.from);
            return;
        };
        info!("Chat private from {} ({}) to {}", msg.from_name, msg.from, to);

        if to == SENTINEL_USER_ID {
            // Virtual recipient: no registry lookup, no publish.
            match &self.bot {
                Some(bot) => {
                    let bot = bot.clone();
                    let handle = handle.clone();
                    tokio::spawn(async move {
                        bot.relay(&handle, &msg.from, &msg.message).await;
                    });
                }
                None => warn!("Bot API not configured, dropping message from {}", msg.from),
            }
            return;
        }

        let msg = msg.into_private();
        if let Some(recipient) = self.registry.lookup(&to) {
            recipient.send(ServerEvent::ChatMessage(msg));
            info!("Private message delivered to {} (local)", to);
            return;
        }

        // Recipient may be connected to another instance; publish and let its
        // registry decide. No delivery confirmation exists on this path.
        match self.bus.publish(&RelayEnvelope::ChatPrivate(msg)).await {
            Ok(()) => info!("Private message published for {}", to),
            Err(e) => {
                warn!("Failed to publish private message for {}: {}", to, e);
                handle.send(ServerEvent::user_not_connected(to));
            }
        }
    }

    /// Dispatch one envelope received from the cross-instance channel.
    pub async fn handle_relay(&self, envelope: RelayEnvelope) {
        match envelope {
            RelayEnvelope::LocationUpdate(user) => {
                self.fanout.emit(ServerEvent::UserUpdated(user));
            }
            RelayEnvelope::ChatBroadcast(msg) => {
                info!("Received broadcast message from relay ({})", msg.from);
                self.fanout.emit(ServerEvent::ChatMessage(msg));
            }
            RelayEnvelope::ChatPrivate(msg) => {
                let Some(to) = msg.to.clone() else {
                    warn!("Dropping relayed private message without recipient");
                    return;
                };
                if let Some(recipient) = self.registry.lookup(&to) {
                    recipient.send(ServerEvent::ChatMessage(msg));
                    info!("Delivered relayed private message to local user {}", to);
                }
            }
            RelayEnvelope::UserDeleted { id } => {
                info!("Received user deletion from relay: {}", id);
                self.fanout.emit(ServerEvent::UserDeleted { id });
            }
        }
    }
}
