//! エンティティ定義

use super::value_object::{ConversationId, Timestamp, UserId};

/// 接続に紐づくセッションメタデータ
///
/// 接続が登録されている間だけ存在し、1 接続につき必ず 1 つ。
/// ユーザー ID・会話 ID はどちらも任意（匿名接続・会話未選択の接続を許容する）。
#[derive(Debug, Clone)]
pub struct ClientSession {
    /// 接続 URL のクエリパラメータで渡されたユーザー ID
    pub user_id: Option<UserId>,
    /// 接続 URL のパスで渡された、現在閲覧中の会話 ID
    pub conversation_id: Option<ConversationId>,
    /// 接続時刻
    pub connected_at: Timestamp,
}

impl ClientSession {
    pub fn new(
        user_id: Option<UserId>,
        conversation_id: Option<ConversationId>,
        connected_at: Timestamp,
    ) -> Self {
        Self {
            user_id,
            conversation_id,
            connected_at,
        }
    }

    /// このセッションが指定した会話を閲覧中かどうか
    pub fn is_viewing(&self, conversation_id: &ConversationId) -> bool {
        self.conversation_id.as_ref() == Some(conversation_id)
    }

    /// このセッションが指定したユーザーのものかどうか
    pub fn belongs_to(&self, user_id: &UserId) -> bool {
        self.user_id.as_ref() == Some(user_id)
    }
}
