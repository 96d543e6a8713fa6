//! UseCase: 接続確立処理
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - ConnectUseCase::execute() メソッド
//! - 接続の登録、在席状態への参加、オンライン在席ブロードキャスト
//!
//! ### なぜこのテストが必要か
//! - レジストリと在席状態の両方へ正しく反映されることを保証
//! - オンライン通知が「自分以外の全接続」に届くことを保証
//! - 匿名接続（ユーザー ID なし）が在席通知を発しないことを保証
//!
//! ### どのような状況を想定しているか
//! - 正常系：ユーザー ID と会話 ID を持つ接続
//! - エッジケース：匿名接続、会話未選択の接続

use std::sync::Arc;

use tokio::sync::Mutex;

use kakehashi_shared::time::get_utc_timestamp;

use crate::{
    domain::{ClientSession, ConversationId, PresenceRoster, PusherChannel, Timestamp, UserId},
    infrastructure::{
        broadcast::Broadcaster,
        dto::websocket::UserPresenceMessage,
        registry::{ConnectionId, ConnectionRegistry},
    },
};

/// 接続確立のユースケース
pub struct ConnectUseCase {
    /// 接続レジストリ
    registry: Arc<ConnectionRegistry>,
    /// 会話ごとの在席状態
    presence: Arc<Mutex<PresenceRoster>>,
    /// ブロードキャスター
    broadcaster: Broadcaster,
}

impl ConnectUseCase {
    /// 新しい ConnectUseCase を作成
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

    /// 接続確立を実行
    ///
    /// 1. レジストリへ登録
    /// 2. (user, conversation) が揃っていれば在席状態へ参加
    /// 3. ユーザー ID があればオンライン在席を自分以外へブロードキャスト
    ///
    /// # Returns
    ///
    /// 採番された接続 ID と生成されたセッション
    pub async fn execute(
        &self,
        sender: PusherChannel,
        user_id: Option<UserId>,
        conversation_id: Option<ConversationId>,
    ) -> (ConnectionId, ClientSession) {
        let connected_at = Timestamp::new(get_utc_timestamp());

        // 1. レジストリへ登録
        let (connection_id, session) = self
            .registry
            .register(sender, user_id, conversation_id, connected_at)
            .await;

        // 2. 在席状態へ参加
        if let (Some(user), Some(conversation)) = (&session.user_id, &session.conversation_id) {
            let mut presence = self.presence.lock().await;
            presence.on_join(conversation.clone(), user.clone());
        }

        // 3. オンライン在席ブロードキャスト（自分以外）
        if let Some(user) = &session.user_id {
            let envelope = UserPresenceMessage::new(user.to_string(), true);
            let json = serde_json::to_string(&envelope).unwrap();
            self.broadcaster
                .broadcast_to_all(&json, Some(connection_id))
                .await;
            tracing::info!("User '{}' connected (connection '{}')", user, connection_id);
        } else {
            tracing::info!("Anonymous connection '{}' established", connection_id);
        }

        (connection_id, session)
    }
}
