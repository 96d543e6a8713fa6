//! UseCase: 通知ディスパッチ
//!
//! ## 責務
//!
//! - 新着メッセージ: 参加者ディレクトリから受信者を取得し、送信者以外の
//!   各参加者へ通知レコードを、送信者へアクティビティレコードを永続化する
//! - フォロー: フォローされたユーザーへ通知レコードを 1 件永続化する
//!
//! ## 設計ノート
//!
//! 参加者ディレクトリへの問い合わせだけは await する（受信者が分からなければ
//! 何も始まらないため）。永続化呼び出しは全て独立したタスクとして spawn し、
//! 接続処理の経路を一切ブロックしない。永続化の失敗はタスク内でログに残し、
//! 決して呼び出し元へ伝播させない。
//!
//! ディレクトリ問い合わせが失敗した場合、そのメッセージの通知パスは
//! 全体を諦める（沈黙であって、リトライではない）。個々の永続化失敗は
//! 兄弟の呼び出しに影響しない。

use std::sync::Arc;

use crate::domain::{
    ActivityRecord, ConversationId, NotificationRecord, NotificationStore, ParticipantDirectory,
    UserId,
};
use crate::infrastructure::dto::websocket::{FollowEvent, NewMessagePayload};

/// 通知・アクティビティのディスパッチャー
pub struct NotificationDispatcher {
    /// 参加者ディレクトリ（外部読み取り依存）
    directory: Arc<dyn ParticipantDirectory>,
    /// 通知・アクティビティ永続化（外部書き込み依存）
    store: Arc<dyn NotificationStore>,
}

impl NotificationDispatcher {
    /// 新しい NotificationDispatcher を作成
    pub fn new(directory: Arc<dyn ParticipantDirectory>, store: Arc<dyn NotificationStore>) -> Self {
        Self { directory, store }
    }

    /// 新着メッセージの通知パイプラインを実行
    ///
    /// 参加者ディレクトリの取得が完了するまで await する。永続化は spawn され、
    /// このメソッドの完了を待たずに進む。
    pub async fn notify_new_message(&self, message: &NewMessagePayload) {
        let Ok(conversation_id) = ConversationId::new(message.conversation_id.clone()) else {
            tracing::warn!("new_message without a valid conversation id, skipping notifications");
            return;
        };

        let participants = match self.directory.active_participants(&conversation_id).await {
            Ok(participants) => participants,
            Err(e) => {
                tracing::warn!(
                    "Participant lookup failed for conversation '{}', skipping notifications: {}",
                    conversation_id,
                    e
                );
                return;
            }
        };

        // 受信者数 = 参加者数 - 1（送信者の分）
        let recipient_count = participants.len().saturating_sub(1);

        // 送信者以外の各参加者へ 1 件ずつ通知を永続化
        for participant in participants {
            if participant.as_str() == message.sender_id {
                continue;
            }
            let record = NotificationRecord {
                user_id: participant,
                kind: "message".to_string(),
                title: message.notification_title(),
                message: message.content.clone(),
                data: message.notification_data(),
            };
            self.spawn_save_notification(record);
        }

        // 送信者のアクティビティを 1 件永続化
        let Ok(sender_id) = UserId::new(message.sender_id.clone()) else {
            tracing::warn!("new_message without a valid sender id, skipping activity");
            return;
        };
        let activity = ActivityRecord {
            user_id: sender_id,
            kind: "message".to_string(),
            title: "Sent a message".to_string(),
            description: format!(
                "Sent a message to {} recipient(s) in conversation {}",
                recipient_count, message.conversation_id
            ),
            category: "communication".to_string(),
            visibility: "private".to_string(),
            data: serde_json::json!({
                "conversation_id": message.conversation_id,
                "message_id": message.id,
                "recipient_count": recipient_count,
            }),
        };
        self.spawn_save_activity(activity);
    }

    /// フォローの通知パイプラインを実行
    pub async fn notify_follow(&self, event: &FollowEvent) {
        let Ok(followed_id) = UserId::new(event.followed_id.clone()) else {
            tracing::warn!("follow event without a valid followed id, skipping notification");
            return;
        };

        let record = NotificationRecord {
            user_id: followed_id,
            kind: "follow".to_string(),
            title: "New follower".to_string(),
            message: event.notification_message(),
            data: event.notification_data(),
        };
        self.spawn_save_notification(record);
    }

    /// 通知の永続化を独立タスクとして実行する
    ///
    /// 失敗はタスク内でログに残すだけで、接続処理の経路には決して影響しない。
    fn spawn_save_notification(&self, record: NotificationRecord) {
        let store = self.store.clone();
        tokio::spawn(async move {
            let recipient = record.user_id.clone();
            if let Err(e) = store.save_notification(record).await {
                tracing::warn!("Failed to save notification for user '{}': {}", recipient, e);
            }
        });
    }

    /// アクティビティの永続化を独立タスクとして実行する
    fn spawn_save_activity(&self, record: ActivityRecord) {
        let store = self.store.clone();
        tokio::spawn(async move {
            let actor = record.user_id.clone();
            if let Err(e) = store.save_user_activity(record).await {
                tracing::warn!("Failed to save user activity for '{}': {}", actor, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DirectoryError, MockParticipantDirectory, NotifyError};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    /// 永続化呼び出しを記録するフェイク実装
    ///
    /// spawn されたタスクからの呼び出しをチャンネル経由で観測する。
    struct RecordingStore {
        notifications: mpsc::UnboundedSender<NotificationRecord>,
        activities: mpsc::UnboundedSender<ActivityRecord>,
        fail: bool,
    }

    #[async_trait]
    impl NotificationStore for RecordingStore {
        async fn save_notification(&self, record: NotificationRecord) -> Result<(), NotifyError> {
            self.notifications.send(record).ok();
            if self.fail {
                return Err(NotifyError::Status(500));
            }
            Ok(())
        }

        async fn save_user_activity(&self, record: ActivityRecord) -> Result<(), NotifyError> {
            self.activities.send(record).ok();
            if self.fail {
                return Err(NotifyError::Status(500));
            }
            Ok(())
        }
    }

    fn create_recording_store(
        fail: bool,
    ) -> (
        Arc<RecordingStore>,
        mpsc::UnboundedReceiver<NotificationRecord>,
        mpsc::UnboundedReceiver<ActivityRecord>,
    ) {
        let (notification_tx, notification_rx) = mpsc::unbounded_channel();
        let (activity_tx, activity_rx) = mpsc::unbounded_channel();
        let store = Arc::new(RecordingStore {
            notifications: notification_tx,
            activities: activity_tx,
            fail,
        });
        (store, notification_rx, activity_rx)
    }

    fn user(id: &str) -> UserId {
        UserId::new(id.to_string()).unwrap()
    }

    fn message_payload(conversation_id: &str, sender_id: &str) -> NewMessagePayload {
        serde_json::from_value(serde_json::json!({
            "conversation_id": conversation_id,
            "sender_id": sender_id,
            "content": "hi",
            "sender": {"username": "alice"},
            "id": "m1",
        }))
        .unwrap()
    }

    async fn recv_within<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for record")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn test_notify_new_message_saves_per_recipient() {
        // テスト項目: 送信者以外の各参加者へ 1 件ずつ通知が保存される
        // given (前提条件): c1 の参加者は u1（送信者）, u2, u3
        let mut directory = MockParticipantDirectory::new();
        directory
            .expect_active_participants()
            .returning(|_| Ok(vec![user("u1"), user("u2"), user("u3")]));
        let (store, mut notification_rx, mut activity_rx) = create_recording_store(false);
        let dispatcher = NotificationDispatcher::new(Arc::new(directory), store);

        // when (操作):
        dispatcher
            .notify_new_message(&message_payload("c1", "u1"))
            .await;

        // then (期待する結果): u2, u3 宛の通知と u1 のアクティビティが保存される
        let first = recv_within(&mut notification_rx).await;
        let second = recv_within(&mut notification_rx).await;
        let mut recipients = vec![first.user_id.clone(), second.user_id.clone()];
        recipients.sort();
        assert_eq!(recipients, vec![user("u2"), user("u3")]);
        assert_eq!(first.kind, "message");
        assert_eq!(first.title, "New message from alice");
        assert_eq!(first.message, "hi");

        let activity = recv_within(&mut activity_rx).await;
        assert_eq!(activity.user_id, user("u1"));
        assert_eq!(activity.kind, "message");
        assert!(activity.description.contains("2 recipient(s)"));

        // 追加の通知は保存されない
        assert!(
            timeout(Duration::from_millis(50), notification_rx.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_notify_new_message_aborts_when_directory_fails() {
        // テスト項目: ディレクトリ問い合わせ失敗時、通知もアクティビティも保存されない
        // given (前提条件):
        let mut directory = MockParticipantDirectory::new();
        directory
            .expect_active_participants()
            .returning(|_| Err(DirectoryError::Status(503)));
        let (store, mut notification_rx, mut activity_rx) = create_recording_store(false);
        let dispatcher = NotificationDispatcher::new(Arc::new(directory), store);

        // when (操作):
        dispatcher
            .notify_new_message(&message_payload("c1", "u1"))
            .await;

        // then (期待する結果): 沈黙（リトライなし）
        assert!(
            timeout(Duration::from_millis(50), notification_rx.recv())
                .await
                .is_err()
        );
        assert!(
            timeout(Duration::from_millis(50), activity_rx.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_notify_new_message_with_sender_only_conversation() {
        // テスト項目: 参加者が送信者だけの場合、通知は 0 件でアクティビティは受信者 0 人
        // given (前提条件):
        let mut directory = MockParticipantDirectory::new();
        directory
            .expect_active_participants()
            .returning(|_| Ok(vec![user("u1")]));
        let (store, mut notification_rx, mut activity_rx) = create_recording_store(false);
        let dispatcher = NotificationDispatcher::new(Arc::new(directory), store);

        // when (操作):
        dispatcher
            .notify_new_message(&message_payload("c1", "u1"))
            .await;

        // then (期待する結果):
        assert!(
            timeout(Duration::from_millis(50), notification_rx.recv())
                .await
                .is_err()
        );
        let activity = recv_within(&mut activity_rx).await;
        assert!(activity.description.contains("0 recipient(s)"));
    }

    #[tokio::test]
    async fn test_notify_new_message_tolerates_store_failure() {
        // テスト項目: 永続化の失敗が呼び出し元にもパニックにもならない
        // given (前提条件): 全ての保存が 500 で失敗する
        let mut directory = MockParticipantDirectory::new();
        directory
            .expect_active_participants()
            .returning(|_| Ok(vec![user("u1"), user("u2")]));
        let (store, mut notification_rx, mut activity_rx) = create_recording_store(true);
        let dispatcher = NotificationDispatcher::new(Arc::new(directory), store);

        // when (操作):
        dispatcher
            .notify_new_message(&message_payload("c1", "u1"))
            .await;

        // then (期待する結果): 呼び出し自体は行われ、失敗は握りつぶされる
        let record = recv_within(&mut notification_rx).await;
        assert_eq!(record.user_id, user("u2"));
        let activity = recv_within(&mut activity_rx).await;
        assert_eq!(activity.user_id, user("u1"));
    }

    #[tokio::test]
    async fn test_notify_follow_saves_single_notification() {
        // テスト項目: フォローでフォローされたユーザー宛の通知が 1 件だけ保存される
        // given (前提条件):
        let directory = MockParticipantDirectory::new();
        let (store, mut notification_rx, mut activity_rx) = create_recording_store(false);
        let dispatcher = NotificationDispatcher::new(Arc::new(directory), store);
        let event: FollowEvent = serde_json::from_value(serde_json::json!({
            "action": "follow",
            "followedId": "u2",
            "followerId": "u1",
            "followerName": "Alice",
        }))
        .unwrap();

        // when (操作):
        dispatcher.notify_follow(&event).await;

        // then (期待する結果):
        let record = recv_within(&mut notification_rx).await;
        assert_eq!(record.user_id, user("u2"));
        assert_eq!(record.kind, "follow");
        assert_eq!(record.title, "New follower");
        assert_eq!(record.message, "Alice started following you");
        assert!(
            timeout(Duration::from_millis(50), notification_rx.recv())
                .await
                .is_err()
        );
        assert!(
            timeout(Duration::from_millis(50), activity_rx.recv())
                .await
                .is_err()
        );
    }
}
