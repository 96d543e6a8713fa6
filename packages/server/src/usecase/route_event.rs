//! UseCase: 受信イベントの振り分け
//!
//! ## 責務
//!
//! 受信ペイロードをタグで分類し、バリアントごとの配送表に従って
//! Broadcaster / NotificationDispatcher へ振り分けます。
//!
//! ## 配送表
//!
//! | バリアント      | 配送                                                         |
//! |-----------------|--------------------------------------------------------------|
//! | `TypingUpdate`  | 会話内ブロードキャストのみ（送信者除外、永続化なし）         |
//! | `UserPresence`  | 全体ブロードキャスト（送信者除外）                           |
//! | `NewMessage`    | (a) 通知パイプライン完了待ち → (b) 他接続へライブ通知 + 会話一致なら転送 → (c) 会話内へ元ペイロード |
//! | `Follow`        | action が "follow" のときのみ: 永続化 → 対象ユーザーの接続へ直接 2 通 |
//! | `Other`         | 全体ブロードキャストでパススルー（送信者除外）               |
//!
//! (b) は「オンライン中の全員」宛（会話をまたぐ通知）、(c) は「会話の
//! 閲覧者」宛（文脈内の転送）で、宛先集合が異なる独立したステップ。

use std::sync::Arc;

use uuid::Uuid;

use kakehashi_shared::time::{get_utc_timestamp, timestamp_to_utc_rfc3339};

use crate::{
    domain::{ConversationId, UserId},
    infrastructure::{
        broadcast::Broadcaster,
        dto::websocket::{
            ClientEvent, FollowEvent, FollowNotificationMessage, InboundEnvelope, NewMessagePayload,
            NewMessageRelay, NewNotificationMessage, NotificationDto, TypingUpdateEvent,
            UserPresenceEvent, UserPresenceMessage,
        },
        registry::{ConnectionId, ConnectionRegistry},
    },
};

use super::notify::NotificationDispatcher;

/// 受信イベント振り分けのユースケース
pub struct RouteEventUseCase {
    /// 接続レジストリ
    registry: Arc<ConnectionRegistry>,
    /// ブロードキャスター
    broadcaster: Broadcaster,
    /// 通知ディスパッチャー
    dispatcher: Arc<NotificationDispatcher>,
}

impl RouteEventUseCase {
    /// 新しい RouteEventUseCase を作成
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        broadcaster: Broadcaster,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            registry,
            broadcaster,
            dispatcher,
        }
    }

    /// 受信ペイロードを分類して配送する
    ///
    /// パース失敗はメッセージ破棄（ログのみ、接続は維持、返信なし）。
    pub async fn execute(&self, connection_id: ConnectionId, raw_text: &str) {
        // 送信者の userId はセッションから補完する
        let session = self.registry.session_of(connection_id).await;
        let session_user_id = session
            .as_ref()
            .and_then(|s| s.user_id.as_ref())
            .map(|u| u.as_str().to_string());

        let Some(envelope) = InboundEnvelope::classify(raw_text, session_user_id.as_deref())
        else {
            tracing::warn!(
                "Failed to parse inbound payload from connection '{}', dropping",
                connection_id
            );
            return;
        };

        match &envelope.event {
            ClientEvent::TypingUpdate(event) => {
                self.handle_typing_update(connection_id, event, &envelope).await;
            }
            ClientEvent::UserPresence(event) => {
                self.handle_user_presence(connection_id, event).await;
            }
            ClientEvent::NewMessage(event) => {
                self.handle_new_message(connection_id, &event.message, &envelope)
                    .await;
            }
            ClientEvent::Follow(event) => {
                self.handle_follow(event).await;
            }
            ClientEvent::Other { tag } => {
                tracing::debug!("Passing through unrecognized event type '{}'", tag);
                self.broadcaster
                    .broadcast_to_all(&envelope.raw_json(), Some(connection_id))
                    .await;
            }
        }
    }

    /// タイピング中: 会話内へ注入済みペイロードをそのまま転送
    async fn handle_typing_update(
        &self,
        connection_id: ConnectionId,
        event: &TypingUpdateEvent,
        envelope: &InboundEnvelope,
    ) {
        let Ok(conversation_id) = ConversationId::new(event.conversation_id.clone()) else {
            // 会話 ID が空のタイピングイベントは no-op
            tracing::debug!("typing_update without conversation id, ignoring");
            return;
        };
        self.broadcaster
            .broadcast_to_conversation(&conversation_id, &envelope.raw_json(), Some(connection_id))
            .await;
    }

    /// 在席状態: 外向きの形に組み直して全体へ転送
    async fn handle_user_presence(&self, connection_id: ConnectionId, event: &UserPresenceEvent) {
        let outbound = UserPresenceMessage::new(event.user_id.clone(), event.is_online);
        let json = serde_json::to_string(&outbound).unwrap();
        self.broadcaster
            .broadcast_to_all(&json, Some(connection_id))
            .await;
    }

    /// 新着メッセージ: 通知パイプライン → ライブ通知/転送 → 会話内パススルー
    async fn handle_new_message(
        &self,
        connection_id: ConnectionId,
        message: &NewMessagePayload,
        envelope: &InboundEnvelope,
    ) {
        // (a) 通知パイプラインの完了（= 参加者取得の完了）を待つ
        self.dispatcher.notify_new_message(message).await;

        let target_conversation = ConversationId::new(message.conversation_id.clone()).ok();
        let relay_json =
            serde_json::to_string(&NewMessageRelay::from_payload(message)).unwrap();

        // (b) 送信者以外の全接続へライブ通知を、会話が一致する接続へは転送も届ける。
        //     宛先ごとの user_id を載せるため、接続ごとにエンベロープを構築する。
        let snapshot = self.registry.snapshot().await;
        for (id, sender, session) in snapshot {
            if id == connection_id {
                continue;
            }

            let notification = NotificationDto {
                id: Uuid::new_v4().to_string(),
                user_id: session.user_id.as_ref().map(|u| u.to_string()),
                r#type: "message".to_string(),
                title: message.notification_title(),
                message: message.content.clone(),
                data: message.notification_data(),
                read: false,
                created_at: timestamp_to_utc_rfc3339(get_utc_timestamp()),
                category: "chat".to_string(),
                priority: "normal".to_string(),
            };
            let live_json =
                serde_json::to_string(&NewNotificationMessage::new(notification)).unwrap();
            if let Err(e) = sender.send(live_json) {
                tracing::warn!("Failed to push new_notification to connection '{}': {}", id, e);
            }

            if let Some(conversation) = &target_conversation
                && session.is_viewing(conversation)
                && let Err(e) = sender.send(relay_json.clone())
            {
                tracing::warn!("Failed to push new_message relay to connection '{}': {}", id, e);
            }
        }

        // (c) 会話の閲覧者へ元ペイロードをパススルー（送信者除外）
        if let Some(conversation) = &target_conversation {
            self.broadcaster
                .broadcast_to_conversation(conversation, &envelope.raw_json(), Some(connection_id))
                .await;
        }
    }

    /// フォロー: "follow" 以外の action は黙って無視する
    async fn handle_follow(&self, event: &FollowEvent) {
        if event.action != "follow" {
            tracing::debug!("Ignoring follow event with action '{}'", event.action);
            return;
        }

        // 1. 永続化パイプライン
        self.dispatcher.notify_follow(event).await;

        // 2. フォローされたユーザーが接続していれば、その 1 接続へ直接 2 通届ける
        let Ok(followed_id) = UserId::new(event.followed_id.clone()) else {
            tracing::warn!("follow event without a valid followed id, skipping delivery");
            return;
        };
        let Some(target) = self.registry.find_by_user(&followed_id).await else {
            return;
        };

        let notification = NotificationDto {
            id: Uuid::new_v4().to_string(),
            user_id: Some(followed_id.to_string()),
            r#type: "follow".to_string(),
            title: "New follower".to_string(),
            message: event.notification_message(),
            data: event.notification_data(),
            read: false,
            created_at: timestamp_to_utc_rfc3339(get_utc_timestamp()),
            category: "social".to_string(),
            priority: "normal".to_string(),
        };
        let live_json = serde_json::to_string(&NewNotificationMessage::new(notification)).unwrap();
        if let Err(e) = self.broadcaster.send_to(target, &live_json).await {
            tracing::warn!("Failed to push new_notification to followed user: {}", e);
        }

        // 後方互換クライアント向けの旧形式も続けて届ける
        let legacy_json =
            serde_json::to_string(&FollowNotificationMessage::from_event(event)).unwrap();
        if let Err(e) = self.broadcaster.send_to(target, &legacy_json).await {
            tracing::warn!("Failed to push follow_notification to followed user: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        DirectoryError, MockNotificationStore, MockParticipantDirectory, NotificationStore,
        ParticipantDirectory, Timestamp,
    };
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    fn user(id: &str) -> UserId {
        UserId::new(id.to_string()).unwrap()
    }

    fn conversation(id: &str) -> ConversationId {
        ConversationId::new(id.to_string()).unwrap()
    }

    fn create_usecase(
        directory: Arc<dyn ParticipantDirectory>,
        store: Arc<dyn NotificationStore>,
    ) -> (RouteEventUseCase, Arc<ConnectionRegistry>) {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone());
        let dispatcher = Arc::new(NotificationDispatcher::new(directory, store));
        let usecase = RouteEventUseCase::new(registry.clone(), broadcaster, dispatcher);
        (usecase, registry)
    }

    fn silent_store() -> Arc<MockNotificationStore> {
        let mut store = MockNotificationStore::new();
        store.expect_save_notification().returning(|_| Ok(()));
        store.expect_save_user_activity().returning(|_| Ok(()));
        Arc::new(store)
    }

    fn empty_directory() -> Arc<MockParticipantDirectory> {
        let mut directory = MockParticipantDirectory::new();
        directory
            .expect_active_participants()
            .returning(|_| Ok(vec![]));
        Arc::new(directory)
    }

    async fn register(
        registry: &ConnectionRegistry,
        user_id: Option<&str>,
        conversation_id: Option<&str>,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (id, _) = registry
            .register(
                tx,
                user_id.map(|u| user(u)),
                conversation_id.map(|c| conversation(c)),
                Timestamp::new(0),
            )
            .await;
        (id, rx)
    }

    fn parse(raw: String) -> serde_json::Value {
        serde_json::from_str(&raw).unwrap()
    }

    #[tokio::test]
    async fn test_typing_update_reaches_only_same_conversation() {
        // テスト項目: タイピングイベントが同じ会話の他接続だけに届く
        // given (前提条件): A(u1,c1), B(u2,c1), C(u3,c2)
        let (usecase, registry) = create_usecase(empty_directory(), silent_store());
        let (a_id, mut a_rx) = register(&registry, Some("u1"), Some("c1")).await;
        let (_b_id, mut b_rx) = register(&registry, Some("u2"), Some("c1")).await;
        let (_c_id, mut c_rx) = register(&registry, Some("u3"), Some("c2")).await;

        // when (操作): A がタイピングイベントを送る
        usecase
            .execute(a_id, r#"{"type":"typing_update","conversationId":"c1"}"#)
            .await;

        // then (期待する結果): B だけが userId 注入済みのペイロードを受信する
        let received = parse(b_rx.try_recv().unwrap());
        assert_eq!(received["type"], "typing_update");
        assert_eq!(received["conversationId"], "c1");
        assert_eq!(received["userId"], "u1");
        assert!(a_rx.try_recv().is_err());
        assert!(c_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_user_presence_broadcasts_to_all_except_sender() {
        // テスト項目: 在席イベントが送信者以外の全接続に届く
        // given (前提条件):
        let (usecase, registry) = create_usecase(empty_directory(), silent_store());
        let (a_id, mut a_rx) = register(&registry, Some("u1"), Some("c1")).await;
        let (_b_id, mut b_rx) = register(&registry, Some("u2"), Some("c2")).await;

        // when (操作):
        usecase
            .execute(
                a_id,
                r#"{"type":"user_presence","userId":"u1","isOnline":false}"#,
            )
            .await;

        // then (期待する結果):
        let received = parse(b_rx.try_recv().unwrap());
        assert_eq!(received["type"], "user_presence");
        assert_eq!(received["userId"], "u1");
        assert_eq!(received["isOnline"], false);
        assert!(a_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_tag_is_passed_through_to_all() {
        // テスト項目: 未知のタグが全接続へそのままパススルーされる
        // given (前提条件):
        let (usecase, registry) = create_usecase(empty_directory(), silent_store());
        let (a_id, mut a_rx) = register(&registry, Some("u1"), Some("c1")).await;
        let (_b_id, mut b_rx) = register(&registry, Some("u2"), Some("c2")).await;

        // when (操作):
        usecase
            .execute(a_id, r#"{"type":"custom_ping","payload":42}"#)
            .await;

        // then (期待する結果): 元のフィールドが保存され userId が注入される
        let received = parse(b_rx.try_recv().unwrap());
        assert_eq!(received["type"], "custom_ping");
        assert_eq!(received["payload"], 42);
        assert_eq!(received["userId"], "u1");
        assert!(a_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_malformed_payload_is_dropped() {
        // テスト項目: パース不能なペイロードが黙って破棄される
        // given (前提条件):
        let (usecase, registry) = create_usecase(empty_directory(), silent_store());
        let (a_id, _a_rx) = register(&registry, Some("u1"), Some("c1")).await;
        let (_b_id, mut b_rx) = register(&registry, Some("u2"), Some("c1")).await;

        // when (操作):
        usecase.execute(a_id, "not json at all").await;
        usecase.execute(a_id, r#"{"noType":true}"#).await;

        // then (期待する結果): 何も配送されない
        assert!(b_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_new_message_fan_out_audiences() {
        // テスト項目: 新着メッセージの 3 系統の配送が正しい宛先集合に届く
        // given (前提条件): A(u1,c1) 送信者, B(u2,c1) 同会話, C(u3,c2) 別会話
        let mut directory = MockParticipantDirectory::new();
        directory
            .expect_active_participants()
            .returning(|_| Ok(vec![user("u1"), user("u2")]));
        let (usecase, registry) = create_usecase(Arc::new(directory), silent_store());
        let (a_id, mut a_rx) = register(&registry, Some("u1"), Some("c1")).await;
        let (_b_id, mut b_rx) = register(&registry, Some("u2"), Some("c1")).await;
        let (_c_id, mut c_rx) = register(&registry, Some("u3"), Some("c2")).await;

        // when (操作): A がメッセージを送信する
        let payload = r#"{
            "type": "new_message",
            "message": {
                "conversation_id": "c1",
                "sender_id": "u1",
                "content": "hi",
                "sender": {"username": "alice"},
                "id": "m1"
            }
        }"#;
        usecase.execute(a_id, payload).await;

        // then (期待する結果):
        // B はライブ通知 + 転送 + 元ペイロードの 3 通を受信する
        let b_first = parse(b_rx.try_recv().unwrap());
        assert_eq!(b_first["type"], "new_notification");
        assert_eq!(b_first["notification"]["user_id"], "u2");
        assert_eq!(b_first["notification"]["title"], "New message from alice");
        let b_second = parse(b_rx.try_recv().unwrap());
        assert_eq!(b_second["type"], "new_message");
        assert_eq!(b_second["senderName"], "alice");
        assert_eq!(b_second["messageId"], "m1");
        let b_third = parse(b_rx.try_recv().unwrap());
        assert_eq!(b_third["type"], "new_message");
        assert_eq!(b_third["message"]["content"], "hi");
        assert!(b_rx.try_recv().is_err());

        // C はライブ通知だけを受信する（会話が違うので転送されない）
        let c_first = parse(c_rx.try_recv().unwrap());
        assert_eq!(c_first["type"], "new_notification");
        assert_eq!(c_first["notification"]["user_id"], "u3");
        assert!(c_rx.try_recv().is_err());

        // 送信者 A は何も受信しない
        assert!(a_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_new_message_fan_out_proceeds_when_directory_fails() {
        // テスト項目: ディレクトリ失敗は通知パスだけを諦め、ファンアウトは行われる
        // given (前提条件):
        let mut directory = MockParticipantDirectory::new();
        directory
            .expect_active_participants()
            .returning(|_| Err(DirectoryError::MissingBaseUrl));
        let (usecase, registry) = create_usecase(Arc::new(directory), silent_store());
        let (a_id, _a_rx) = register(&registry, Some("u1"), Some("c1")).await;
        let (_b_id, mut b_rx) = register(&registry, Some("u2"), Some("c1")).await;

        // when (操作):
        let payload = r#"{
            "type": "new_message",
            "message": {
                "conversation_id": "c1",
                "sender_id": "u1",
                "content": "hi",
                "sender": {},
                "id": "m1"
            }
        }"#;
        usecase.execute(a_id, payload).await;

        // then (期待する結果): B はライブ通知・転送・元ペイロードを受信する
        assert_eq!(parse(b_rx.try_recv().unwrap())["type"], "new_notification");
        assert_eq!(parse(b_rx.try_recv().unwrap())["type"], "new_message");
        assert_eq!(parse(b_rx.try_recv().unwrap())["type"], "new_message");
    }

    #[tokio::test]
    async fn test_follow_delivers_two_envelopes_to_followed_user_only() {
        // テスト項目: フォローでフォローされたユーザーの接続だけに 2 通届く
        // given (前提条件): A(u1), B(u2) フォロー対象, C(u3)
        let (notification_tx, mut notification_rx) = mpsc::unbounded_channel();
        let mut store = MockNotificationStore::new();
        store.expect_save_notification().returning(move |record| {
            notification_tx.send(record).ok();
            Ok(())
        });
        store.expect_save_user_activity().returning(|_| Ok(()));
        let (usecase, registry) = create_usecase(empty_directory(), Arc::new(store));
        let (a_id, mut a_rx) = register(&registry, Some("u1"), None).await;
        let (_b_id, mut b_rx) = register(&registry, Some("u2"), None).await;
        let (_c_id, mut c_rx) = register(&registry, Some("u3"), None).await;

        // when (操作):
        let payload = r#"{
            "type": "follow",
            "action": "follow",
            "followedId": "u2",
            "followerId": "u1",
            "followerName": "Alice"
        }"#;
        usecase.execute(a_id, payload).await;

        // then (期待する結果): B だけがライブ通知と旧形式通知を受信する
        let first = parse(b_rx.try_recv().unwrap());
        assert_eq!(first["type"], "new_notification");
        assert_eq!(first["notification"]["type"], "follow");
        assert_eq!(first["notification"]["user_id"], "u2");
        let second = parse(b_rx.try_recv().unwrap());
        assert_eq!(second["type"], "follow_notification");
        assert_eq!(second["followerId"], "u1");
        assert_eq!(second["followedId"], "u2");
        assert_eq!(second["followerName"], "Alice");
        assert!(b_rx.try_recv().is_err());
        assert!(a_rx.try_recv().is_err());
        assert!(c_rx.try_recv().is_err());

        // 永続化は 1 件だけ
        let record = timeout(Duration::from_secs(1), notification_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.user_id, user("u2"));
        assert!(
            timeout(Duration::from_millis(50), notification_rx.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_follow_with_other_action_is_silently_ignored() {
        // テスト項目: action が "follow" 以外のフォローイベントは何も起こさない
        // given (前提条件):
        let (notification_tx, mut notification_rx) = mpsc::unbounded_channel();
        let mut store = MockNotificationStore::new();
        store.expect_save_notification().returning(move |record| {
            notification_tx.send(record).ok();
            Ok(())
        });
        store.expect_save_user_activity().returning(|_| Ok(()));
        let (usecase, registry) = create_usecase(empty_directory(), Arc::new(store));
        let (a_id, _a_rx) = register(&registry, Some("u1"), None).await;
        let (_b_id, mut b_rx) = register(&registry, Some("u2"), None).await;

        // when (操作):
        let payload = r#"{
            "type": "follow",
            "action": "unfollow",
            "followedId": "u2",
            "followerId": "u1"
        }"#;
        usecase.execute(a_id, payload).await;

        // then (期待する結果): 配送も永続化も発生しない
        assert!(b_rx.try_recv().is_err());
        assert!(
            timeout(Duration::from_millis(50), notification_rx.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_follow_for_offline_user_persists_without_delivery() {
        // テスト項目: フォロー対象が未接続でも永続化だけは行われる
        // given (前提条件): u2 は接続していない
        let (notification_tx, mut notification_rx) = mpsc::unbounded_channel();
        let mut store = MockNotificationStore::new();
        store.expect_save_notification().returning(move |record| {
            notification_tx.send(record).ok();
            Ok(())
        });
        store.expect_save_user_activity().returning(|_| Ok(()));
        let (usecase, registry) = create_usecase(empty_directory(), Arc::new(store));
        let (a_id, mut a_rx) = register(&registry, Some("u1"), None).await;

        // when (操作):
        let payload = r#"{
            "type": "follow",
            "action": "follow",
            "followedId": "u2",
            "followerId": "u1"
        }"#;
        usecase.execute(a_id, payload).await;

        // then (期待する結果):
        let record = timeout(Duration::from_secs(1), notification_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.user_id, user("u2"));
        assert!(a_rx.try_recv().is_err());
    }
}
