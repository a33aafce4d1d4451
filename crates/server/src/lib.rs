//! Geochat Server Library
//!
//! Distributed presence and chat relay: instances share a Redis-backed
//! presence store and pub/sub channel so a client connected to any instance
//! sees every user's location and can message users on other instances.

pub mod bot;
pub mod bus;
pub mod config;
pub mod error;
pub mod fanout;
pub mod handlers;
pub mod models;
pub mod protocol;
pub mod reconciler;
pub mod registry;
pub mod router;
pub mod store;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use redis::aio::ConnectionManager;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use bot::BotRelay;
use bus::{run_memory_subscriber, run_redis_subscriber, MemoryBus, RedisBus, RelayBus};
use config::{AppState, PresenceBackend, ServerConfig};
use fanout::LocalFanout;
use handlers::{create_user, delete_user, list_users, ws_handler};
use models::{User, SENTINEL_USER_ID};
use protocol::ServerEvent;
use reconciler::ExpiryReconciler;
use registry::ConnectionRegistry;
use router::MessageRouter;
use store::{MemoryPresenceStore, PresenceStore, RedisPresenceStore};

pub async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    // A second call (tests, embedding) just keeps the existing subscriber.
    let _ = tracing::subscriber::set_global_default(subscriber);

    info!("=== Geochat Server ===");
    info!("Features: Presence | Geo Index | Chat Relay | Bot Relay");

    let config = ServerConfig::from_env();

    let registry = Arc::new(ConnectionRegistry::new());
    let fanout = LocalFanout::new();

    let bot = match &config.bot_api_url {
        Some(url) => {
            info!("Bot relay enabled: {}", url);
            Some(Arc::new(BotRelay::new(url.clone())))
        }
        None => {
            info!("Bot relay disabled (BOT_API_URL not set)");
            None
        }
    };

    // Presence store, relay bus and the subscriber loop, per backend.
    let (store, bus, router): (Arc<dyn PresenceStore>, Arc<dyn RelayBus>, Arc<MessageRouter>) =
        match config.backend {
            PresenceBackend::Redis => {
                let client = redis::Client::open(config.redis_url())?;
                let mut con = ConnectionManager::new(client.clone()).await?;
                let _: String = redis::cmd("PING").query_async(&mut con).await?;
                info!(
                    "Connected to Redis at {}:{}",
                    config.redis_host, config.redis_port
                );

                let store: Arc<dyn PresenceStore> =
                    Arc::new(RedisPresenceStore::new(con.clone(), config.presence_ttl));
                let bus: Arc<dyn RelayBus> = Arc::new(RedisBus::new(con));
                let router = Arc::new(MessageRouter::new(
                    store.clone(),
                    bus.clone(),
                    registry.clone(),
                    fanout.clone(),
                    bot,
                ));

                let subscriber_router = router.clone();
                tokio::spawn(async move {
                    if let Err(e) = run_redis_subscriber(client, subscriber_router).await {
                        error!("Relay subscriber failed: {}", e);
                    }
                });

                (store, bus, router)
            }
            PresenceBackend::Memory => {
                info!("Memory backend initialized (single-node only)");
                let store: Arc<dyn PresenceStore> =
                    Arc::new(MemoryPresenceStore::new(config.presence_ttl));
                let memory_bus = Arc::new(MemoryBus::new());
                let relay_rx = memory_bus.subscribe();
                let bus: Arc<dyn RelayBus> = memory_bus;
                let router = Arc::new(MessageRouter::new(
                    store.clone(),
                    bus.clone(),
                    registry.clone(),
                    fanout.clone(),
                    bot,
                ));
                tokio::spawn(run_memory_subscriber(relay_rx, router.clone()));
                (store, bus, router)
            }
        };

    // Start from a clean shared state, then seed the sentinel user.
    info!("Initializing presence data");
    store.wipe().await?;
    register_sentinel(store.as_ref(), &fanout).await?;

    // Expiry reconciler runs for the lifetime of the process.
    let reconciler = Arc::new(ExpiryReconciler::new(
        store.clone(),
        bus.clone(),
        registry.clone(),
        fanout.clone(),
        config.reconcile_interval,
    ));
    tokio::spawn(reconciler.run());
    info!(
        "Expiry reconciler started (interval: {:?}, ttl: {:?})",
        config.reconcile_interval, config.presence_ttl
    );

    let app_state = AppState {
        store,
        bus,
        registry,
        fanout,
        router,
    };

    let app = Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/{user_id}", axum::routing::delete(delete_user))
        .route("/ws", get(ws_handler))
        .route("/health", get(health_check))
        .with_state(app_state)
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Geochat Server running on http://{}", addr);
    info!("WebSocket endpoint: ws://localhost:{}/ws", config.port);
    info!("HTTP endpoints: GET/POST /users, DELETE /users/{{user_id}}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Seed the always-present virtual participant: drop any stale entry,
/// recreate it (no TTL) and announce it.
async fn register_sentinel(
    store: &dyn PresenceStore,
    fanout: &LocalFanout,
) -> anyhow::Result<()> {
    info!("Registering sentinel user: {}", SENTINEL_USER_ID);
    store.delete(SENTINEL_USER_ID).await?;

    let sentinel = User::sentinel();
    store.upsert(&sentinel).await?;
    info!(
        "Registered {} at position [{}, {}] without expiration",
        sentinel.id, sentinel.longitude, sentinel.latitude
    );

    fanout.emit(ServerEvent::UserAdded(sentinel));
    Ok(())
}

async fn health_check() -> &'static str {
    "OK - Geochat Server"
}
