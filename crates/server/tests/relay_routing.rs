mod common;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast::error::TryRecvError;

use server::bus::{BusError, RelayBus};
use server::models::{ChatKind, ChatMessage, User};
use server::protocol::{ClientEvent, RelayEnvelope, ServerEvent};
use server::store::PresenceStore;

use common::{connection, harness};

fn private(from: &str, to: &str, message: &str) -> ChatMessage {
    ChatMessage {
        kind: None,
        from: from.to_string(),
        from_name: from.to_string(),
        to: Some(to.to_string()),
        message: message.to_string(),
        timestamp: "2024-01-01T00:00:00Z".to_string(),
    }
}

#[tokio::test]
async fn local_private_chat_is_delivered_without_publish() {
    let h = harness();
    let mut bus_rx = h.bus.subscribe();

    let (alice, mut alice_rx) = connection();
    h.registry.register("alice", alice);
    let (bob, _bob_rx) = connection();

    h.router
        .handle_client_event(&bob, ClientEvent::ChatPrivate(private("bob", "alice", "hi")))
        .await;

    match alice_rx.try_recv().unwrap() {
        ServerEvent::ChatMessage(msg) => {
            assert_eq!(msg.kind, Some(ChatKind::Private));
            assert_eq!(msg.from, "bob");
            assert_eq!(msg.to.as_deref(), Some("alice"));
            assert_eq!(msg.message, "hi");
        }
        other => panic!("unexpected event: {:?}", other),
    }

    assert!(matches!(bus_rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn remote_private_chat_publishes_exactly_one_envelope() {
    let h = harness();
    let mut bus_rx = h.bus.subscribe();
    let (bob, mut bob_rx) = connection();

    h.router
        .handle_client_event(&bob, ClientEvent::ChatPrivate(private("bob", "carol", "hi")))
        .await;

    match bus_rx.try_recv().unwrap() {
        RelayEnvelope::ChatPrivate(msg) => {
            assert_eq!(msg.to.as_deref(), Some("carol"));
            assert_eq!(msg.kind, Some(ChatKind::Private));
        }
        other => panic!("unexpected envelope: {:?}", other),
    }
    assert!(matches!(bus_rx.try_recv(), Err(TryRecvError::Empty)));

    // Publish succeeded, so the sender is told nothing.
    assert!(bob_rx.try_recv().is_err());
}

#[tokio::test]
async fn broadcast_chat_is_published_never_delivered_directly() {
    let h = harness();
    let mut bus_rx = h.bus.subscribe();
    let mut fanout_rx = h.fanout.subscribe();

    let (alice, mut alice_rx) = connection();
    h.registry.register("alice", alice);
    let (bob, _bob_rx) = connection();

    let mut msg = private("bob", "ignored", "hello all");
    msg.to = None;
    h.router
        .handle_client_event(&bob, ClientEvent::ChatBroadcast(msg))
        .await;

    match bus_rx.try_recv().unwrap() {
        RelayEnvelope::ChatBroadcast(msg) => {
            assert_eq!(msg.kind, Some(ChatKind::Broadcast));
            assert_eq!(msg.to, None);
        }
        other => panic!("unexpected envelope: {:?}", other),
    }

    // Local delivery only happens when the subscriber hands the envelope
    // back, which this harness does not run.
    assert!(alice_rx.try_recv().is_err());
    assert!(matches!(fanout_rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn location_update_writes_store_publishes_and_acks() {
    let h = harness();
    let mut bus_rx = h.bus.subscribe();
    let mut fanout_rx = h.fanout.subscribe();

    let (alice, mut alice_rx) = connection();
    h.router
        .handle_client_event(
            &alice,
            ClientEvent::Register {
                user_id: "alice".to_string(),
            },
        )
        .await;
    match alice_rx.try_recv().unwrap() {
        ServerEvent::RegisterAck { status, user_id } => {
            assert_eq!(status, "ok");
            assert_eq!(user_id, "alice");
        }
        other => panic!("unexpected event: {:?}", other),
    }

    let user = User::new("alice", "Alice", 35.0, 139.0);
    h.router
        .handle_client_event(&alice, ClientEvent::Location(user.clone()))
        .await;

    assert_eq!(h.store.get("alice").await.unwrap(), Some(user.clone()));
    assert!(matches!(
        bus_rx.try_recv().unwrap(),
        RelayEnvelope::LocationUpdate(published) if published == user
    ));
    assert!(matches!(
        fanout_rx.try_recv().unwrap(),
        ServerEvent::UserUpdated(update) if update == user
    ));
    assert!(matches!(
        alice_rx.try_recv().unwrap(),
        ServerEvent::LocationAck { .. }
    ));

    // Repeating the same update leaves the store observably identical.
    h.router
        .handle_client_event(&alice, ClientEvent::Location(user.clone()))
        .await;
    assert_eq!(h.store.list_all().await.unwrap(), vec![user]);
}

#[tokio::test]
async fn disconnect_purges_registry_but_not_presence() {
    let h = harness();
    let (alice, _alice_rx) = connection();
    let connection_id = alice.id();

    h.router
        .handle_client_event(
            &alice,
            ClientEvent::Register {
                user_id: "alice".to_string(),
            },
        )
        .await;
    h.store
        .upsert(&User::new("alice", "Alice", 35.0, 139.0))
        .await
        .unwrap();

    h.router.handle_disconnect(connection_id);

    assert!(h.registry.lookup("alice").is_none());
    assert!(h.store.get("alice").await.unwrap().is_some());
}

#[tokio::test]
async fn relay_dispatch_reaches_local_connections() {
    let h = harness();
    let mut fanout_rx = h.fanout.subscribe();

    let (alice, mut alice_rx) = connection();
    h.registry.register("alice", alice);

    // Private envelope from another instance: direct delivery to alice only.
    h.router
        .handle_relay(RelayEnvelope::ChatPrivate(
            private("bob", "alice", "over the wire").into_private(),
        ))
        .await;
    assert!(matches!(
        alice_rx.try_recv().unwrap(),
        ServerEvent::ChatMessage(msg) if msg.message == "over the wire"
    ));

    // Private envelope for a user this instance does not hold: ignored.
    h.router
        .handle_relay(RelayEnvelope::ChatPrivate(
            private("bob", "carol", "elsewhere").into_private(),
        ))
        .await;
    assert!(alice_rx.try_recv().is_err());

    // Broadcast and deletion envelopes fan out to everyone.
    h.router
        .handle_relay(RelayEnvelope::ChatBroadcast(
            private("bob", "ignored", "to all").into_broadcast(),
        ))
        .await;
    assert!(matches!(
        fanout_rx.try_recv().unwrap(),
        ServerEvent::ChatMessage(msg) if msg.message == "to all"
    ));

    h.router
        .handle_relay(RelayEnvelope::UserDeleted {
            id: "carol".to_string(),
        })
        .await;
    assert!(matches!(
        fanout_rx.try_recv().unwrap(),
        ServerEvent::UserDeleted { id } if id == "carol"
    ));
}

struct FailingBus;

#[async_trait]
impl RelayBus for FailingBus {
    async fn publish(&self, _envelope: &RelayEnvelope) -> Result<(), BusError> {
        Err(BusError::Closed)
    }
}

#[tokio::test]
async fn failed_private_publish_tells_the_sender() {
    use std::sync::Arc;

    use server::fanout::LocalFanout;
    use server::registry::ConnectionRegistry;
    use server::router::MessageRouter;
    use server::store::MemoryPresenceStore;

    let router = MessageRouter::new(
        Arc::new(MemoryPresenceStore::new(Duration::from_secs(60))),
        Arc::new(FailingBus),
        Arc::new(ConnectionRegistry::new()),
        LocalFanout::new(),
        None,
    );

    let (bob, mut bob_rx) = connection();
    router
        .handle_client_event(&bob, ClientEvent::ChatPrivate(private("bob", "carol", "hi")))
        .await;

    match bob_rx.try_recv().unwrap() {
        ServerEvent::ChatError { error, user_id } => {
            assert_eq!(error, "User not connected");
            assert_eq!(user_id, "carol");
        }
        other => panic!("unexpected event: {:?}", other),
    }
}
