//! WebSocket connection handlers.
//!
//! Connections arrive on `/conversations/{conversation_id}` (or bare
//! `/conversations`) with an optional `userId` query parameter. Identity is
//! resolved upstream; both identifiers are optional and an invalid value is
//! treated as absent rather than rejecting the connection.

use std::sync::Arc;

use axum::{
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::domain::{ConversationId, UserId};

use super::super::state::AppState;

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

/// WebSocket endpoint for `/conversations/{conversation_id}`
pub async fn ws_conversation_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<String>,
    Query(query): Query<ConnectQuery>,
) -> impl IntoResponse {
    accept_connection(ws, state, Some(conversation_id), query)
}

/// WebSocket endpoint for `/conversations` (no conversation selected)
pub async fn ws_root_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
) -> impl IntoResponse {
    accept_connection(ws, state, None, query)
}

fn accept_connection(
    ws: WebSocketUpgrade,
    state: Arc<AppState>,
    conversation_id: Option<String>,
    query: ConnectQuery,
) -> impl IntoResponse {
    // 不正な識別子は「無し」として扱い、接続自体は受け入れる
    let user_id = query.user_id.and_then(|raw| match UserId::new(raw) {
        Ok(user_id) => Some(user_id),
        Err(e) => {
            tracing::warn!("Invalid userId on connection URL, treating as anonymous: {}", e);
            None
        }
    });
    let conversation_id = conversation_id.and_then(|raw| match ConversationId::new(raw) {
        Ok(conversation_id) => Some(conversation_id),
        Err(e) => {
            tracing::warn!("Invalid conversation id on connection URL, ignoring: {}", e);
            None
        }
    });

    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id, conversation_id))
}

/// Spawns a task that receives messages from the rx channel and pushes them
/// to the WebSocket sender.
///
/// This function handles the outbound message flow: envelopes addressed to
/// this connection (via rx channel) are written to its WebSocket.
fn pusher_loop(
    mut rx: mpsc::UnboundedReceiver<String>,
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            // Send the message to this client
            if sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    })
}

async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    user_id: Option<UserId>,
    conversation_id: Option<ConversationId>,
) {
    let (sender, mut receiver) = socket.split();

    // Create a channel for this connection to receive envelopes
    let (tx, rx) = mpsc::unbounded_channel();

    // Connect sequence: register + presence join + online presence broadcast
    let (connection_id, _session) = state
        .connect_usecase
        .execute(tx, user_id, conversation_id)
        .await;

    // Spawn a task to push envelopes from other handlers to this client
    let mut send_task = pusher_loop(rx, sender);

    let state_clone = state.clone();

    // Spawn a task to receive messages from this client
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::error!("WebSocket error: {}", e);
                    break;
                }
            };

            match msg {
                Message::Text(text) => {
                    tracing::debug!("Received text on connection '{}': {}", connection_id, text);
                    state_clone
                        .route_event_usecase
                        .execute(connection_id, &text)
                        .await;
                }
                Message::Ping(_) => {
                    tracing::debug!("Received ping");
                    // Ping/pong is handled automatically by the WebSocket protocol
                }
                Message::Close(_) => {
                    tracing::info!("Connection '{}' requested close", connection_id);
                    break;
                }
                _ => {}
            }
        }
    });

    // If any one of the tasks completes, abort the other
    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    };

    // Disconnect sequence: offline presence broadcast + registry removal +
    // presence leave
    state.disconnect_usecase.execute(connection_id).await;
}
