//! UseCase 層
//!
//! 接続・切断・イベント振り分け・通知ディスパッチの各ユースケースを提供します。
//! UI 層（WebSocket ハンドラ）はここで定義されたユースケースを呼び出すだけで、
//! レジストリや在席状態の操作順序はユースケース側が保証します。

mod connect;
mod disconnect;
mod notify;
mod route_event;

pub use connect::ConnectUseCase;
pub use disconnect::DisconnectUseCase;
pub use notify::NotificationDispatcher;
pub use route_event::RouteEventUseCase;
