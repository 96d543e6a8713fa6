//! ブロードキャスト（ファンアウト）実装
//!
//! ## 責務
//!
//! - レジストリのスナップショットに対する絞り込み付きファンアウト
//! - フォロー通知などの特定接続への直接送信
//!
//! ## 設計ノート
//!
//! 各送信は個別の失敗境界で隔離します。1 接続への送信失敗は warn ログを
//! 残すだけで、残りの宛先への配送を中断しません。送信失敗でレジストリを
//! 変更することもありません（削除は切断・刈り取り経路の仕事）。

use std::sync::Arc;

use crate::domain::{ClientSession, ConversationId, MessagePushError, UserId};

use super::registry::{ConnectionId, ConnectionRegistry};

/// レジストリ上の接続へのファンアウトを担うブロードキャスター
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// 指定した会話を閲覧中の全接続へ送信する（exclude を除く）
    pub async fn broadcast_to_conversation(
        &self,
        conversation_id: &ConversationId,
        payload: &str,
        exclude: Option<ConnectionId>,
    ) {
        self.fan_out(payload, exclude, |session: &ClientSession| {
            session.is_viewing(conversation_id)
        })
        .await;
    }

    /// 登録中の全接続へ送信する（exclude を除く）
    pub async fn broadcast_to_all(&self, payload: &str, exclude: Option<ConnectionId>) {
        self.fan_out(payload, exclude, |_| true).await;
    }

    /// 指定した接続へ直接送信する
    pub async fn send_to(
        &self,
        id: ConnectionId,
        payload: &str,
    ) -> Result<(), MessagePushError> {
        let sender = self
            .registry
            .sender_of(id)
            .await
            .ok_or_else(|| MessagePushError::ConnectionNotFound(id.to_string()))?;
        sender
            .send(payload.to_string())
            .map_err(|e| MessagePushError::PushFailed(e.to_string()))
    }

    /// 指定したユーザーの開いている接続 1 つへ直接送信する
    pub async fn send_to_user(
        &self,
        user_id: &UserId,
        payload: &str,
    ) -> Result<(), MessagePushError> {
        let id = self
            .registry
            .find_by_user(user_id)
            .await
            .ok_or_else(|| MessagePushError::UserNotConnected(user_id.to_string()))?;
        self.send_to(id, payload).await
    }

    async fn fan_out<F>(&self, payload: &str, exclude: Option<ConnectionId>, filter: F)
    where
        F: Fn(&ClientSession) -> bool,
    {
        let snapshot = self.registry.snapshot().await;
        for (id, sender, session) in snapshot {
            if Some(id) == exclude {
                continue;
            }
            if !filter(&session) {
                continue;
            }
            // ファンアウトでは一部の送信失敗を許容
            if let Err(e) = sender.send(payload.to_string()) {
                tracing::warn!("Failed to push message to connection '{}': {}", id, e);
            } else {
                tracing::debug!("Pushed message to connection '{}'", id);
            }
        }
    }
}
