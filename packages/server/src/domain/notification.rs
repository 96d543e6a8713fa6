//! 通知・アクティビティ永続化へのインターフェース
//!
//! 通知とアクティビティは外部 API が永続化します。レコードはイベントごとに
//! 構築される一時的な値で、外部 API へ渡した後は保持しません（成功・失敗を
//! 問わずリトライキューも持ちません）。

use async_trait::async_trait;
use thiserror::Error;

use super::value_object::UserId;

/// 受信者向けの通知レコード
#[derive(Debug, Clone)]
pub struct NotificationRecord {
    /// 受信者のユーザー ID
    pub user_id: UserId,
    /// 通知種別タグ（"message", "follow" など）
    pub kind: String,
    /// タイトル
    pub title: String,
    /// 短い本文
    pub message: String,
    /// 構造化ペイロード
    pub data: serde_json::Value,
}

/// 送信者側の監査用アクティビティレコード
#[derive(Debug, Clone)]
pub struct ActivityRecord {
    /// 行為者のユーザー ID
    pub user_id: UserId,
    /// アクティビティ種別タグ
    pub kind: String,
    /// タイトル
    pub title: String,
    /// 説明
    pub description: String,
    /// カテゴリ
    pub category: String,
    /// 可視性（"private" など）
    pub visibility: String,
    /// 構造化ペイロード
    pub data: serde_json::Value,
}

/// 通知・アクティビティ永続化のインターフェース
///
/// 実装側の失敗は呼び出し元へ伝播させず、ログに残して握りつぶすのが
/// このリレーの方針（クライアントには「通知が保存されたかどうか」を
/// 区別させない）。エラーを返すのは実装と呼び出し側のログのためだけ。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// 通知レコードを外部 API へ保存する
    async fn save_notification(&self, record: NotificationRecord) -> Result<(), NotifyError>;

    /// アクティビティレコードを外部 API へ保存する
    async fn save_user_activity(&self, record: ActivityRecord) -> Result<(), NotifyError>;
}

/// 通知永続化エラー
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification API base URL is not configured")]
    MissingBaseUrl,

    #[error("notification API request failed: {0}")]
    Request(String),

    #[error("notification API returned status {0}")]
    Status(u16),
}
