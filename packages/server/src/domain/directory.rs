//! 参加者ディレクトリへのインターフェース
//!
//! 会話の参加者（接続中とは限らない）は外部ストアが管理します。
//! ドメイン層が必要とする読み取りインターフェースをドメイン層自身が定義し、
//! Infrastructure 層が HTTP 実装を提供します（依存性の逆転）。

use async_trait::async_trait;
use thiserror::Error;

use super::value_object::{ConversationId, UserId};

/// 参加者ディレクトリの読み取りインターフェース
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ParticipantDirectory: Send + Sync {
    /// 指定した会話の、離脱していない参加者のユーザー ID 一覧を取得する
    async fn active_participants(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<UserId>, DirectoryError>;
}

/// 参加者ディレクトリへの問い合わせエラー
///
/// ベース URL 未設定は恒常的な外部依存エラーとして扱う（起動失敗にはしない）。
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("participant directory base URL is not configured")]
    MissingBaseUrl,

    #[error("participant directory request failed: {0}")]
    Request(String),

    #[error("participant directory returned status {0}")]
    Status(u16),
}
