//! 接続レジストリ
//!
//! ## 責務
//!
//! - 接続中の WebSocket 接続とセッションメタデータの管理
//! - 「誰がどの会話を閲覧しながら接続しているか」の唯一の情報源
//!
//! ## 設計ノート
//!
//! 接続キーは呼び出し側が持ち込むのではなく `register` が採番します。
//! これにより「同じ接続を二重登録する」というプログラミングエラーが
//! 型の上で起こり得なくなります。
//!
//! ロックは 1 操作につき 1 回だけ取得します。操作をまたぐ原子性は提供しません
//! （ブロードキャスト中に別ハンドラが接続を削除してもよい）。送信失敗は
//! レジストリを変更せず、削除は切断・刈り取り経路だけが行います。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;

use crate::domain::{ClientSession, ConversationId, PusherChannel, Timestamp, UserId};

/// 採番された接続 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// レジストリに登録される接続エントリ
struct ConnectionEntry {
    sender: PusherChannel,
    session: ClientSession,
}

/// 接続レジストリ
pub struct ConnectionRegistry {
    next_id: AtomicU64,
    connections: Mutex<HashMap<ConnectionId, ConnectionEntry>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// 接続を登録し、採番した ID と生成したセッションを返す
    pub async fn register(
        &self,
        sender: PusherChannel,
        user_id: Option<UserId>,
        conversation_id: Option<ConversationId>,
        connected_at: Timestamp,
    ) -> (ConnectionId, ClientSession) {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let session = ClientSession::new(user_id, conversation_id, connected_at);

        let mut connections = self.connections.lock().await;
        connections.insert(
            id,
            ConnectionEntry {
                sender,
                session: session.clone(),
            },
        );
        tracing::debug!("Connection '{}' registered", id);

        (id, session)
    }

    /// 接続を削除し、存在していた場合はそのセッションを返す（冪等）
    pub async fn remove(&self, id: ConnectionId) -> Option<ClientSession> {
        let mut connections = self.connections.lock().await;
        let removed = connections.remove(&id).map(|entry| entry.session);
        if removed.is_some() {
            tracing::debug!("Connection '{}' removed from registry", id);
        }
        removed
    }

    /// 指定した接続のセッションを取得する
    pub async fn session_of(&self, id: ConnectionId) -> Option<ClientSession> {
        let connections = self.connections.lock().await;
        connections.get(&id).map(|entry| entry.session.clone())
    }

    /// 指定した接続の送信チャンネルを取得する
    pub async fn sender_of(&self, id: ConnectionId) -> Option<PusherChannel> {
        let connections = self.connections.lock().await;
        connections.get(&id).map(|entry| entry.sender.clone())
    }

    /// 指定したユーザーの開いている接続を 1 つ返す
    ///
    /// 同一ユーザーが複数接続している場合にどれが返るかは未定義
    /// （「最初に見つかったもの」であり、「最新のもの」ではない）。
    pub async fn find_by_user(&self, user_id: &UserId) -> Option<ConnectionId> {
        let connections = self.connections.lock().await;
        connections
            .iter()
            .find(|(_, entry)| entry.session.belongs_to(user_id))
            .map(|(id, _)| *id)
    }

    /// ブロードキャスト用に現在の (接続 ID, チャンネル, セッション) の
    /// スナップショットを返す
    ///
    /// スナップショットを返すことで、走査中に別ハンドラがエントリを
    /// 削除しても安全になる。
    pub async fn snapshot(&self) -> Vec<(ConnectionId, PusherChannel, ClientSession)> {
        let connections = self.connections.lock().await;
        connections
            .iter()
            .map(|(id, entry)| (*id, entry.sender.clone(), entry.session.clone()))
            .collect()
    }

    /// チャンネルが閉じている接続を削除し、削除したエントリを返す
    ///
    /// 明示的な切断通知なしに死んだ接続の刈り取りに使う。
    pub async fn reap_closed(&self) -> Vec<(ConnectionId, ClientSession)> {
        let mut connections = self.connections.lock().await;
        let dead_ids: Vec<ConnectionId> = connections
            .iter()
            .filter(|(_, entry)| entry.sender.is_closed())
            .map(|(id, _)| *id)
            .collect();

        let mut reaped = Vec::with_capacity(dead_ids.len());
        for id in dead_ids {
            if let Some(entry) = connections.remove(&id) {
                tracing::info!("Connection '{}' reaped (channel closed)", id);
                reaped.push((id, entry.session));
            }
        }
        reaped
    }

    /// 登録中の接続数
    pub async fn count(&self) -> usize {
        let connections = self.connections.lock().await;
        connections.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
