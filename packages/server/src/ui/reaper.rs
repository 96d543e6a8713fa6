//! 刈り取りタスク
//!
//! ## 責務
//!
//! 明示的な切断通知なしにチャンネルが死んだ接続を、固定間隔でレジストリと
//! 在席状態から取り除きます。
//!
//! ## 設計ノート
//!
//! 刈り取り経路はオフライン在席ブロードキャストを発しません（発するのは
//! 明示的な切断経路のみ）。刈り取られたユーザーは、他のクライアントからは
//! 次のシグナルまでオンラインに見え続けます。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::{domain::PresenceRoster, infrastructure::registry::ConnectionRegistry};

/// 刈り取りタスクを起動する
///
/// # Arguments
///
/// * `registry` - 接続レジストリ
/// * `presence` - 会話ごとの在席状態
/// * `interval` - スキャン間隔
///
/// # Returns
///
/// 起動したタスクの `JoinHandle`（シャットダウン時に abort する）
pub fn spawn_reaper(
    registry: Arc<ConnectionRegistry>,
    presence: Arc<Mutex<PresenceRoster>>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // 最初の tick は即時に完了する
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let reaped = registry.reap_closed().await;
            if reaped.is_empty() {
                continue;
            }
            tracing::info!("Reaped {} dead connection(s)", reaped.len());

            let mut roster = presence.lock().await;
            for (_, session) in &reaped {
                if let (Some(user), Some(conversation)) =
                    (&session.user_id, &session.conversation_id)
                {
                    roster.on_leave(conversation, user);
                }
            }
        }
    })
}
