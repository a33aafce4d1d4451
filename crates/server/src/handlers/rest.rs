//! REST endpoints over the presence store.
//!
//! Thin wrappers: each mutation writes the store, publishes the matching
//! relay envelope for other instances, and emits the client-facing event
//! locally. A store failure surfaces as a 500; a publish failure degrades to
//! a log line since the next periodic update converges anyway.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::AppState;
use crate::error::{Error, Result};
use crate::models::User;
use crate::protocol::{RelayEnvelope, ServerEvent};

/// GET /users
pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>> {
    let users = state.store.list_all().await?;
    Ok(Json(users))
}

/// POST /users
pub async fn create_user(
    State(state): State<AppState>,
    Json(user): Json<User>,
) -> Result<(StatusCode, Json<User>)> {
    if user.id.is_empty() {
        return Err(Error::BadRequest("user id must not be empty".to_string()));
    }

    state.store.upsert(&user).await?;
    info!("User created via REST: {} ({})", user.name, user.id);

    if let Err(e) = state
        .bus
        .publish(&RelayEnvelope::LocationUpdate(user.clone()))
        .await
    {
        warn!("Failed to publish created user {}: {}", user.id, e);
    }
    state.fanout.emit(ServerEvent::UserAdded(user.clone()));

    Ok((StatusCode::CREATED, Json(user)))
}

/// DELETE /users/{user_id}
pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Value>> {
    state.store.delete(&user_id).await?;
    info!("User deleted via REST: {}", user_id);

    if let Err(e) = state
        .bus
        .publish(&RelayEnvelope::UserDeleted {
            id: user_id.clone(),
        })
        .await
    {
        warn!("Failed to publish deletion of {}: {}", user_id, e);
    }
    state.fanout.emit(ServerEvent::UserDeleted { id: user_id });

    Ok(Json(json!({ "message": "User deleted" })))
}
