//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{Json, extract::State};

use super::super::state::AppState;

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Debug endpoint to inspect the current connection state (for manual testing)
pub async fn debug_connections(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let connections = state.registry.count().await;
    let active_conversations = state.presence.lock().await.conversation_count();
    Json(serde_json::json!({
        "connections": connections,
        "active_conversations": active_conversations,
    }))
}
