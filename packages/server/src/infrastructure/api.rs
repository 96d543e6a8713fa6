//! 通知・アクティビティ永続化 API / 参加者ディレクトリの HTTP 実装
//!
//! ## 責務
//!
//! - `NotificationStore` / `ParticipantDirectory` trait の HTTP 実装
//! - サーバー発のリクエストであることを示すヘッダの付与
//!
//! ## 設計ノート
//!
//! ベース URL は設定されないことがあります。その場合、全ての呼び出しは
//! 即座に設定エラーとして失敗します（起動失敗にはせず、呼び出し側が
//! ログに残して握りつぶす恒常的な外部依存エラー）。

use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::{
    ActivityRecord, ConversationId, DirectoryError, NotificationRecord, NotificationStore,
    NotifyError, ParticipantDirectory, UserId,
};

/// サーバー発リクエストであることを示すヘッダ
const INTERNAL_REQUEST_HEADER: &str = "X-Internal-Request";

/// 参加者ディレクトリのレスポンスボディ
#[derive(Debug, Deserialize)]
struct ParticipantsResponse {
    participants: Vec<String>,
}

/// 外部永続化 API への HTTP クライアント
///
/// 通知 API と参加者ディレクトリは同じベース URL 配下にあるため、
/// 1 つのクライアントが両方の trait を実装する。
pub struct HttpApiClient {
    http: reqwest::Client,
    base_url: Option<String>,
}

impl HttpApiClient {
    /// 新しい HttpApiClient を作成
    ///
    /// # Arguments
    ///
    /// * `base_url` - 外部 API のベース URL（例: `http://localhost:3000`）。
    ///   `None` の場合は全ての呼び出しが設定エラーになる。
    pub fn new(base_url: Option<String>) -> Self {
        let base_url = base_url.map(|url| url.trim_end_matches('/').to_string());
        if base_url.is_none() {
            tracing::warn!(
                "Persistence API base URL is not configured; notification calls will fail"
            );
        }
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl NotificationStore for HttpApiClient {
    async fn save_notification(&self, record: NotificationRecord) -> Result<(), NotifyError> {
        let base = self.base_url.as_deref().ok_or(NotifyError::MissingBaseUrl)?;

        let body = serde_json::json!({
            "user_id": record.user_id.as_str(),
            "type": record.kind,
            "title": record.title,
            "message": record.message,
            "data": record.data,
        });

        let response = self
            .http
            .post(format!("{base}/api/notifications"))
            .header(INTERNAL_REQUEST_HEADER, "true")
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifyError::Status(response.status().as_u16()));
        }
        Ok(())
    }

    async fn save_user_activity(&self, record: ActivityRecord) -> Result<(), NotifyError> {
        let base = self.base_url.as_deref().ok_or(NotifyError::MissingBaseUrl)?;

        let body = serde_json::json!({
            "user_id": record.user_id.as_str(),
            "type": record.kind,
            "title": record.title,
            "description": record.description,
            "category": record.category,
            "visibility": record.visibility,
            "data": record.data,
        });

        let response = self
            .http
            .post(format!("{base}/api/user-activity"))
            .header(INTERNAL_REQUEST_HEADER, "true")
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifyError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl ParticipantDirectory for HttpApiClient {
    async fn active_participants(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<UserId>, DirectoryError> {
        let base = self
            .base_url
            .as_deref()
            .ok_or(DirectoryError::MissingBaseUrl)?;

        let response = self
            .http
            .get(format!(
                "{base}/api/conversations/{}/participants",
                conversation_id.as_str()
            ))
            .header(INTERNAL_REQUEST_HEADER, "true")
            .send()
            .await
            .map_err(|e| DirectoryError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DirectoryError::Status(response.status().as_u16()));
        }

        let body: ParticipantsResponse = response
            .json()
            .await
            .map_err(|e| DirectoryError::Request(e.to_string()))?;

        // ディレクトリ側の不正な ID は警告を残して読み飛ばす
        let participants = body
            .participants
            .into_iter()
            .filter_map(|raw| match UserId::new(raw) {
                Ok(user_id) => Some(user_id),
                Err(e) => {
                    tracing::warn!("Participant directory returned invalid user id: {}", e);
                    None
                }
            })
            .collect();

        Ok(participants)
    }
}
