//! HTTP surface: REST endpoints for the presence store and the WebSocket
//! upgrade for real-time clients.

pub mod rest;
pub mod socket;

pub use rest::{create_user, delete_user, list_users};
pub use socket::ws_handler;
