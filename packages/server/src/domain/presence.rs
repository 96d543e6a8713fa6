//! 会話ごとの在席状態（ConversationPresenceSet）
//!
//! ## 不変条件
//!
//! - あるユーザーがある会話に「在席」しているのは、その (user, conversation)
//!   ペアを持つ登録済みセッションが 1 つ以上存在するときに限る
//! - 空になった会話のエントリは保持せず削除する
//!
//! 同一ユーザーが同じ会話に複数の接続を張れるため、内部では参照カウントで
//! 管理します。単純な集合だと 2 接続のうち 1 接続の切断で在席が消えてしまい、
//! 上記の不変条件が破れます。

use std::collections::HashMap;

use super::value_object::{ConversationId, UserId};

/// 会話 ID → 在席中ユーザー集合のマッピング
#[derive(Debug, Default)]
pub struct PresenceRoster {
    /// 会話ごとの在席ユーザーと、そのユーザーが張っている接続数
    joined: HashMap<ConversationId, HashMap<UserId, usize>>,
}

impl PresenceRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// 参加を記録する（接続確立時に呼ばれる）
    pub fn on_join(&mut self, conversation_id: ConversationId, user_id: UserId) {
        let members = self.joined.entry(conversation_id).or_default();
        *members.entry(user_id).or_insert(0) += 1;
    }

    /// 退出を記録する（切断・刈り取り時に呼ばれる）
    ///
    /// 同じペアの接続が残っている間は在席のまま。未知のペアに対しては何もしない（冪等）。
    pub fn on_leave(&mut self, conversation_id: &ConversationId, user_id: &UserId) {
        let Some(members) = self.joined.get_mut(conversation_id) else {
            return;
        };
        if let Some(count) = members.get_mut(user_id) {
            *count -= 1;
            if *count == 0 {
                members.remove(user_id);
            }
        }
        if members.is_empty() {
            self.joined.remove(conversation_id);
        }
    }

    /// 指定した会話の在席ユーザー一覧を返す（ID でソート済み）
    pub fn members_of(&self, conversation_id: &ConversationId) -> Vec<UserId> {
        let mut members: Vec<UserId> = self
            .joined
            .get(conversation_id)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    /// 指定したユーザーが指定した会話に在席しているかどうか
    pub fn contains(&self, conversation_id: &ConversationId, user_id: &UserId) -> bool {
        self.joined
            .get(conversation_id)
            .is_some_and(|m| m.contains_key(user_id))
    }

    /// 在席者が 1 人以上いる会話の数
    pub fn conversation_count(&self) -> usize {
        self.joined.len()
    }
}
