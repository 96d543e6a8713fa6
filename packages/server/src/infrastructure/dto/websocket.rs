//! WebSocket メッセージ DTO
//!
//! ## 受信側
//!
//! 受信ペイロードは `type` タグ付きの JSON です。タグごとに型付きの
//! バリアントへ分類し、未知のタグは `Other` として扱います（未知タグの
//! パススルー転送は宣言された挙動であり、分岐漏れではない）。
//! パース失敗（JSON でない・`type` がない・既知タグなのに形が合わない）は
//! メッセージ破棄であり、接続や処理を止めません。
//!
//! ## 送信側
//!
//! 送信エンベロープは全て `type` フィールドを持つ JSON です。

use serde::{Deserialize, Serialize};

/// メッセージ種別タグ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    TypingUpdate,
    NewMessage,
    UserPresence,
    Follow,
    NewNotification,
    FollowNotification,
}

// ========================================
// 受信 DTO
// ========================================

/// タイピング中イベント
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingUpdateEvent {
    pub conversation_id: String,
    pub user_id: Option<String>,
}

/// 新着メッセージイベント
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessageEvent {
    pub message: NewMessagePayload,
    pub user_id: Option<String>,
}

/// 新着メッセージの本体
///
/// 本体のキーは外部ストアの行形式に合わせた snake_case（トップレベルの
/// camelCase とは異なる）。
#[derive(Debug, Clone, Deserialize)]
pub struct NewMessagePayload {
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    #[serde(default)]
    pub sender: SenderProfile,
    pub id: String,
}

impl NewMessagePayload {
    /// 通知タイトルに使う送信者の表示名
    pub fn sender_display_name(&self) -> &str {
        self.sender
            .first_name
            .as_deref()
            .or(self.sender.username.as_deref())
            .unwrap_or("Someone")
    }

    /// 通知タイトル（永続化レコードとライブ通知で共通）
    pub fn notification_title(&self) -> String {
        format!("New message from {}", self.sender_display_name())
    }

    /// 通知の構造化ペイロード（永続化レコードとライブ通知で共通）
    pub fn notification_data(&self) -> serde_json::Value {
        serde_json::json!({
            "conversation_id": self.conversation_id,
            "message_id": self.id,
            "sender_id": self.sender_id,
        })
    }
}

/// 送信者のプロフィール（どちらも任意）
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SenderProfile {
    pub first_name: Option<String>,
    pub username: Option<String>,
}

/// 在席状態イベント
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPresenceEvent {
    pub user_id: String,
    pub is_online: bool,
}

/// フォローイベント
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowEvent {
    pub action: String,
    pub followed_id: String,
    pub follower_id: String,
    pub follower_name: Option<String>,
    pub timestamp: Option<serde_json::Value>,
}

impl FollowEvent {
    /// 通知タイトルに使うフォロワーの表示名
    pub fn follower_display_name(&self) -> &str {
        self.follower_name.as_deref().unwrap_or("Someone")
    }

    /// 通知本文（永続化レコードとライブ通知で共通）
    pub fn notification_message(&self) -> String {
        format!("{} started following you", self.follower_display_name())
    }

    /// 通知の構造化ペイロード（永続化レコードとライブ通知で共通）
    pub fn notification_data(&self) -> serde_json::Value {
        serde_json::json!({
            "follower_id": self.follower_id,
            "action": self.action,
            "timestamp": self.timestamp,
        })
    }
}

/// タグで分類された受信イベント
#[derive(Debug, Clone)]
pub enum ClientEvent {
    TypingUpdate(TypingUpdateEvent),
    NewMessage(NewMessageEvent),
    UserPresence(UserPresenceEvent),
    Follow(FollowEvent),
    /// 未知のタグ（パススルー転送の対象）
    Other { tag: String },
}

/// 分類済みの受信メッセージ
///
/// パススルー転送用に、userId 注入後の元ペイロードも保持する。
#[derive(Debug, Clone)]
pub struct InboundEnvelope {
    pub event: ClientEvent,
    raw: serde_json::Value,
}

impl InboundEnvelope {
    /// 生ペイロードを分類する
    ///
    /// ペイロードに `userId` がなく、接続のセッションがユーザー ID を
    /// 持っている場合は、後続処理の前にペイロードへ注入する。
    ///
    /// # Returns
    ///
    /// * `Some(InboundEnvelope)` - 分類成功（未知タグ含む）
    /// * `None` - 破棄対象（JSON でない・`type` がない・既知タグの形不一致）
    pub fn classify(raw_text: &str, session_user_id: Option<&str>) -> Option<Self> {
        let mut raw: serde_json::Value = serde_json::from_str(raw_text).ok()?;
        let tag = raw.get("type")?.as_str()?.to_string();

        // セッションから userId を注入
        if let Some(user_id) = session_user_id
            && raw.get("userId").is_none_or(|v| v.is_null())
        {
            raw["userId"] = serde_json::Value::String(user_id.to_string());
        }

        let event = match tag.as_str() {
            "typing_update" => {
                ClientEvent::TypingUpdate(serde_json::from_value(raw.clone()).ok()?)
            }
            "new_message" => ClientEvent::NewMessage(serde_json::from_value(raw.clone()).ok()?),
            "user_presence" => {
                ClientEvent::UserPresence(serde_json::from_value(raw.clone()).ok()?)
            }
            "follow" => ClientEvent::Follow(serde_json::from_value(raw.clone()).ok()?),
            _ => ClientEvent::Other { tag },
        };

        Some(Self { event, raw })
    }

    /// 注入済みペイロードを JSON 文字列として返す（パススルー転送用）
    pub fn raw_json(&self) -> String {
        self.raw.to_string()
    }
}

// ========================================
// 送信 DTO
// ========================================

/// 在席状態エンベロープ
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPresenceMessage {
    pub r#type: MessageType,
    pub user_id: String,
    pub is_online: bool,
}

impl UserPresenceMessage {
    pub fn new(user_id: String, is_online: bool) -> Self {
        Self {
            r#type: MessageType::UserPresence,
            user_id,
            is_online,
        }
    }
}

/// ライブ通知エンベロープ
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNotificationMessage {
    pub r#type: MessageType,
    pub notification: NotificationDto,
}

impl NewNotificationMessage {
    pub fn new(notification: NotificationDto) -> Self {
        Self {
            r#type: MessageType::NewNotification,
            notification,
        }
    }
}

/// ライブ通知の本体
///
/// 外部 API が永続化する通知行と同じ形。`user_id` は受信側接続のユーザー ID
/// （匿名接続では null）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationDto {
    pub id: String,
    pub user_id: Option<String>,
    pub r#type: String,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
    pub read: bool,
    pub created_at: String,
    pub category: String,
    pub priority: String,
}

/// 会話内へ転送する新着メッセージエンベロープ
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessageRelay {
    pub r#type: MessageType,
    pub sender_name: String,
    pub content: String,
    pub conversation_id: String,
    pub message_id: String,
}

impl NewMessageRelay {
    pub fn from_payload(payload: &NewMessagePayload) -> Self {
        Self {
            r#type: MessageType::NewMessage,
            sender_name: payload.sender_display_name().to_string(),
            content: payload.content.clone(),
            conversation_id: payload.conversation_id.clone(),
            message_id: payload.id.clone(),
        }
    }
}

/// 旧形式のフォロー通知エンベロープ（後方互換クライアント向けに維持）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowNotificationMessage {
    pub r#type: MessageType,
    pub follower_id: String,
    pub followed_id: String,
    pub follower_name: String,
    pub action: String,
    pub timestamp: Option<serde_json::Value>,
}

impl FollowNotificationMessage {
    pub fn from_event(event: &FollowEvent) -> Self {
        Self {
            r#type: MessageType::FollowNotification,
            follower_id: event.follower_id.clone(),
            followed_id: event.followed_id.clone(),
            follower_name: event.follower_display_name().to_string(),
            action: event.action.clone(),
            timestamp: event.timestamp.clone(),
        }
    }
}
