//! WebSocket client session management.

use futures_util::{SinkExt, StreamExt};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use uuid::Uuid;

use crate::error::ClientError;
use crate::formatter::MessageFormatter;
use crate::ui::redisplay_prompt;

/// Build the relay connection URL from the base URL and identifiers.
///
/// `ws://host:port` + `/conversations[/{conversation_id}]` + `?userId=...`
fn build_connect_url(
    base_url: &str,
    user_id: Option<&str>,
    conversation_id: Option<&str>,
) -> String {
    let base = base_url.trim_end_matches('/');
    let mut url = match conversation_id {
        Some(conversation_id) => format!("{}/conversations/{}", base, conversation_id),
        None => format!("{}/conversations", base),
    };
    if let Some(user_id) = user_id {
        url.push_str(&format!("?userId={}", user_id));
    }
    url
}

/// Build a `new_message` event payload from one line of input.
fn build_message_payload(
    line: &str,
    user_id: Option<&str>,
    conversation_id: Option<&str>,
) -> String {
    let sender_id = user_id.unwrap_or("anonymous");
    serde_json::json!({
        "type": "new_message",
        "message": {
            "conversation_id": conversation_id.unwrap_or(""),
            "sender_id": sender_id,
            "content": line,
            "sender": {"username": sender_id},
            "id": Uuid::new_v4().to_string(),
        },
    })
    .to_string()
}

/// Run one WebSocket client session until the connection drops or the user
/// exits.
pub async fn run_client_session(
    base_url: &str,
    user_id: Option<&str>,
    conversation_id: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let url = build_connect_url(base_url, user_id, conversation_id);

    let (ws_stream, _response) = connect_async(&url)
        .await
        .map_err(|e| ClientError::ConnectionError(e.to_string()))?;

    tracing::info!("Connected to relay server!");
    let user_label = user_id.unwrap_or("anonymous").to_string();
    match conversation_id {
        Some(conversation_id) => println!(
            "\nYou are '{}' in conversation '{}'. Type messages and press Enter to send. Press Ctrl+C to exit.\n",
            user_label, conversation_id
        ),
        None => println!(
            "\nYou are '{}' (no conversation selected). Type messages and press Enter to send. Press Ctrl+C to exit.\n",
            user_label
        ),
    }

    let (mut write, mut read) = ws_stream.split();

    // Task: render envelopes pushed by the relay
    let reader_label = user_label.clone();
    let mut read_task = tokio::spawn(async move {
        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    print!("{}", MessageFormatter::format_incoming(&text));
                    redisplay_prompt(&reader_label);
                }
                Ok(Message::Close(_)) => {
                    tracing::info!("Server closed the connection");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("WebSocket error: {}", e);
                    break;
                }
            }
        }
    });

    // Task: read stdin lines with rustyline on a blocking thread
    let (input_tx, mut input_rx) = mpsc::unbounded_channel::<String>();
    let prompt_label = user_label.clone();
    let mut input_task = tokio::task::spawn_blocking(move || -> Result<(), ReadlineError> {
        let mut editor = DefaultEditor::new()?;
        loop {
            match editor.readline(&format!("{}> ", prompt_label)) {
                Ok(line) => {
                    let line = line.trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    if input_tx.send(line).is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(e) => {
                    tracing::warn!("Input error: {}", e);
                    break;
                }
            }
        }
        Ok(())
    });

    // Forward input lines to the relay until either side finishes
    let session_result = loop {
        tokio::select! {
            _ = &mut read_task => {
                // 接続が落ちた。呼び出し側が再接続を判断する
                break Err(ClientError::ConnectionError("connection closed by server".to_string()));
            }
            _ = &mut input_task => {
                // ユーザーが終了した。クローズを送って正常終了
                let _ = write.send(Message::Close(None)).await;
                break Ok(());
            }
            line = input_rx.recv() => {
                match line {
                    Some(line) => {
                        let payload = build_message_payload(&line, user_id, conversation_id);
                        if let Err(e) = write.send(Message::Text(payload.into())).await {
                            break Err(ClientError::SendError(e.to_string()));
                        }
                    }
                    None => break Ok(()),
                }
            }
        }
    };

    read_task.abort();
    input_task.abort();

    session_result.map_err(Into::into)
}
