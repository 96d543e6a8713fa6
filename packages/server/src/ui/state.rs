//! Server state shared across handlers.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    domain::PresenceRoster,
    infrastructure::registry::ConnectionRegistry,
    usecase::{ConnectUseCase, DisconnectUseCase, RouteEventUseCase},
};

/// Shared application state
pub struct AppState {
    /// ConnectUseCase（接続確立のユースケース）
    pub connect_usecase: Arc<ConnectUseCase>,
    /// DisconnectUseCase（切断処理のユースケース）
    pub disconnect_usecase: Arc<DisconnectUseCase>,
    /// RouteEventUseCase（受信イベント振り分けのユースケース）
    pub route_event_usecase: Arc<RouteEventUseCase>,
    /// 接続レジストリ（デバッグエンドポイントと刈り取りタスクが参照）
    pub registry: Arc<ConnectionRegistry>,
    /// 会話ごとの在席状態
    pub presence: Arc<Mutex<PresenceRoster>>,
}
