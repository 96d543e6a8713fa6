//! Message formatting utilities for client display.

use chrono::DateTime;

use kakehashi_server::infrastructure::dto::websocket::{
    FollowNotificationMessage, NewMessageEvent, NewMessageRelay, NewNotificationMessage,
    TypingUpdateEvent, UserPresenceMessage,
};

/// Message formatter for client display
pub struct MessageFormatter;

impl MessageFormatter {
    /// Format any envelope received from the relay.
    ///
    /// Falls back to a raw dump for payloads the client does not recognize
    /// (the relay passes unknown event types through unchanged).
    pub fn format_incoming(text: &str) -> String {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
            return Self::format_raw_message(text);
        };

        match value.get("type").and_then(|t| t.as_str()) {
            Some("user_presence") => serde_json::from_value::<UserPresenceMessage>(value.clone())
                .map(|m| Self::format_user_presence(&m.user_id, m.is_online))
                .unwrap_or_else(|_| Self::format_raw_message(text)),
            Some("typing_update") => serde_json::from_value::<TypingUpdateEvent>(value.clone())
                .map(|m| Self::format_typing(m.user_id.as_deref()))
                .unwrap_or_else(|_| Self::format_raw_message(text)),
            Some("new_message") => {
                // 会話内転送（senderName あり）と元ペイロードのパススルー
                // （message オブジェクトあり）の両方が届く
                if value.get("message").is_some() {
                    serde_json::from_value::<NewMessageEvent>(value.clone())
                        .map(|m| {
                            Self::format_chat_message(
                                m.message.sender_display_name(),
                                &m.message.content,
                            )
                        })
                        .unwrap_or_else(|_| Self::format_raw_message(text))
                } else {
                    serde_json::from_value::<NewMessageRelay>(value.clone())
                        .map(|m| Self::format_chat_message(&m.sender_name, &m.content))
                        .unwrap_or_else(|_| Self::format_raw_message(text))
                }
            }
            Some("new_notification") => {
                serde_json::from_value::<NewNotificationMessage>(value.clone())
                    .map(|m| {
                        Self::format_notification(
                            &m.notification.title,
                            &m.notification.message,
                            &m.notification.created_at,
                        )
                    })
                    .unwrap_or_else(|_| Self::format_raw_message(text))
            }
            Some("follow_notification") => {
                serde_json::from_value::<FollowNotificationMessage>(value.clone())
                    .map(|m| Self::format_follow(&m.follower_name))
                    .unwrap_or_else(|_| Self::format_raw_message(text))
            }
            _ => Self::format_raw_message(text),
        }
    }

    /// Format a presence change notification
    pub fn format_user_presence(user_id: &str, is_online: bool) -> String {
        let state = if is_online { "online" } else { "offline" };
        format!("\n* {} is now {}\n", user_id, state)
    }

    /// Format a typing indicator
    pub fn format_typing(user_id: Option<&str>) -> String {
        format!("\n* {} is typing...\n", user_id.unwrap_or("someone"))
    }

    /// Format a chat message
    pub fn format_chat_message(from: &str, content: &str) -> String {
        format!(
            "\n\n------------------------------------------------------------\n\
             @{}: {}\n\
             ------------------------------------------------------------\n",
            from, content
        )
    }

    /// Format a live notification
    ///
    /// `created_at` is RFC 3339; only the time-of-day is shown.
    pub fn format_notification(title: &str, message: &str, created_at: &str) -> String {
        let time = DateTime::parse_from_rfc3339(created_at)
            .map(|dt| dt.format("%H:%M:%S").to_string())
            .unwrap_or_else(|_| created_at.to_string());
        format!("\n[{}] {}: {}\n", time, title, message)
    }

    /// Format a legacy follow notification
    pub fn format_follow(follower_name: &str) -> String {
        format!("\n* {} started following you\n", follower_name)
    }

    /// Format a raw text message (when parsing fails or the type is unknown)
    pub fn format_raw_message(text: &str) -> String {
        format!("\n← Received: {}\n", text)
    }
}
