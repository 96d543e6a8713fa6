//! HTTP / WebSocket endpoint handlers.

mod http;
mod websocket;

pub use http::{debug_connections, health_check};
pub use websocket::{ws_conversation_handler, ws_root_handler};
