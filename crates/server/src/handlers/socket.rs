//! WebSocket connection lifecycle.
//!
//! One reader loop per connection feeding the router, and one writer task
//! multiplexing the connection's direct queue with the instance-wide fanout.
//! Frames are JSON `{"event", "data"}` objects; anything that fails to parse
//! into a known client event is logged and dropped.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use crate::config::AppState;
use crate::protocol::{ClientEvent, ServerEvent};
use crate::registry::ConnectionHandle;

/// GET /ws
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    let (tx, mut direct_rx) = mpsc::unbounded_channel();
    let handle = ConnectionHandle::new(tx);
    let mut fanout_rx = state.fanout.subscribe();
    info!("Client connected: {}", handle.id());

    // Snapshot of everyone currently online, sent on connect.
    match state.store.list_all().await {
        Ok(users) => {
            info!("Sending {} users to client {}", users.len(), handle.id());
            handle.send(ServerEvent::AllUsers(users));
        }
        Err(e) => warn!("Failed to list users for {}: {}", handle.id(), e),
    }

    let writer = tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                direct = direct_rx.recv() => match direct {
                    Some(event) => event,
                    None => break,
                },
                shared = fanout_rx.recv() => match shared {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Connection write loop lagged, skipped {} events", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };

            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to encode server event: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => state.router.handle_client_event(&handle, event).await,
                Err(e) => warn!("Dropping unparseable client event: {}", e),
            },
            Message::Close(_) => break,
            // Pings are answered by axum; binary frames are not part of the
            // protocol.
            _ => {}
        }
    }

    info!("Client disconnected: {}", handle.id());
    state.router.handle_disconnect(handle.id());
    writer.abort();
}
