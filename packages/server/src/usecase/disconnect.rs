//! UseCase: 切断処理
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - DisconnectUseCase::execute() メソッド
//! - オフライン在席ブロードキャスト、レジストリ削除、在席状態からの退出
//!
//! ### なぜこのテストが必要か
//! - 「ブロードキャスト → 削除 → 退出」の順序を保証
//!   （オフライン通知は削除前に送るが、自分自身には届かない）
//! - 未登録の接続 ID での呼び出しが安全であることを保証（冪等性）
//!
//! ### どのような状況を想定しているか
//! - 正常系：ユーザー ID を持つ接続の切断
//! - エッジケース：匿名接続の切断、二重切断

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    domain::PresenceRoster,
    infrastructure::{
        broadcast::Broadcaster,
        dto::websocket::UserPresenceMessage,
        registry::{ConnectionId, ConnectionRegistry},
    },
};

/// 切断処理のユースケース
pub struct DisconnectUseCase {
    /// 接続レジストリ
    registry: Arc<ConnectionRegistry>,
    /// 会話ごとの在席状態
    presence: Arc<Mutex<PresenceRoster>>,
    /// ブロードキャスター
    broadcaster: Broadcaster,
}

impl DisconnectUseCase {
    /// 新しい DisconnectUseCase を作成
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        presence: Arc<Mutex<PresenceRoster>>,
        broadcaster: Broadcaster,
    ) -> Self {
        Self {
            registry,
            presence,
            broadcaster,
        }
    }

    /// 切断処理を実行（冪等）
    ///
    /// 1. ユーザー ID があればオフライン在席を自分以外へブロードキャスト
    /// 2. レジストリから削除
    /// 3. 在席状態から退出
    pub async fn execute(&self, connection_id: ConnectionId) {
        let Some(session) = self.registry.session_of(connection_id).await else {
            // 既に刈り取り済みなど。何もしない
            return;
        };

        // 1. オフライン在席ブロードキャスト（自分以外）
        if let Some(user) = &session.user_id {
            let envelope = UserPresenceMessage::new(user.to_string(), false);
            let json = serde_json::to_string(&envelope).unwrap();
            self.broadcaster
                .broadcast_to_all(&json, Some(connection_id))
                .await;
        }

        // 2. レジストリから削除
        self.registry.remove(connection_id).await;

        // 3. 在席状態から退出
        if let (Some(user), Some(conversation)) = (&session.user_id, &session.conversation_id) {
            let mut presence = self.presence.lock().await;
            presence.on_leave(conversation, user);
        }

        tracing::info!("Connection '{}' disconnected and cleaned up", connection_id);
    }
}
