//! メッセージ送信チャンネルの型定義とエラー
//!
//! WebSocket の生成は UI 層で行われ、Registry / Broadcaster は生成済みの
//! `UnboundedSender` を通じてメッセージを送信します。これにより
//! 「WebSocket 接続の受付」と「メッセージの送信」が分離されます。

use thiserror::Error;
use tokio::sync::mpsc;

/// 接続ごとの送信チャンネル
///
/// 送信はノンブロッキング。受信側タスク（WebSocket の writer）が終了すると
/// チャンネルは閉じられ、以降の送信は失敗します。
pub type PusherChannel = mpsc::UnboundedSender<String>;

/// メッセージ送信エラー
#[derive(Debug, Error)]
pub enum MessagePushError {
    /// 指定した接続が登録されていない
    #[error("Connection '{0}' is not registered")]
    ConnectionNotFound(String),

    /// 指定したユーザーの接続が 1 つも開いていない
    #[error("No open connection for user '{0}'")]
    UserNotConnected(String),

    /// チャンネルへの送信に失敗した（受信側が終了済みなど）
    #[error("Failed to push message: {0}")]
    PushFailed(String),
}
