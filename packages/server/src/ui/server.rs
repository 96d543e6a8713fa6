//! Server execution logic.

use std::sync::Arc;
use std::time::Duration;

use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

use crate::{
    domain::PresenceRoster,
    infrastructure::registry::ConnectionRegistry,
    usecase::{ConnectUseCase, DisconnectUseCase, RouteEventUseCase},
};

use super::{
    handler::{debug_connections, health_check, ws_conversation_handler, ws_root_handler},
    reaper::spawn_reaper,
    signal::shutdown_signal,
    state::AppState,
};

/// Real-time conversation relay server
///
/// This struct encapsulates the wired use cases and provides methods to run
/// the server.
///
/// # Example
///
/// ```ignore
/// let server = Server::new(
///     connect_usecase,
///     disconnect_usecase,
///     route_event_usecase,
///     registry,
///     presence,
///     Duration::from_secs(30),
/// );
/// server.run("127.0.0.1".to_string(), 8080).await?;
/// ```
pub struct Server {
    /// ConnectUseCase（接続確立のユースケース）
    connect_usecase: Arc<ConnectUseCase>,
    /// DisconnectUseCase（切断処理のユースケース）
    disconnect_usecase: Arc<DisconnectUseCase>,
    /// RouteEventUseCase（受信イベント振り分けのユースケース）
    route_event_usecase: Arc<RouteEventUseCase>,
    /// 接続レジストリ
    registry: Arc<ConnectionRegistry>,
    /// 会話ごとの在席状態
    presence: Arc<Mutex<PresenceRoster>>,
    /// 刈り取りタスクのスキャン間隔
    reap_interval: Duration,
}

impl Server {
    /// Create a new Server instance
    pub fn new(
        connect_usecase: Arc<ConnectUseCase>,
        disconnect_usecase: Arc<DisconnectUseCase>,
        route_event_usecase: Arc<RouteEventUseCase>,
        registry: Arc<ConnectionRegistry>,
        presence: Arc<Mutex<PresenceRoster>>,
        reap_interval: Duration,
    ) -> Self {
        Self {
            connect_usecase,
            disconnect_usecase,
            route_event_usecase,
            registry,
            presence,
            reap_interval,
        }
    }

    /// Run the relay server
    ///
    /// # Arguments
    ///
    /// * `host` - The host address to bind to (e.g., "127.0.0.1")
    /// * `port` - The port number to bind to (e.g., 8080)
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the specified address
    /// or if there's an error during server execution.
    pub async fn run(self, host: String, port: u16) -> Result<(), Box<dyn std::error::Error>> {
        let bind_addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already-bound listener
    ///
    /// Split out of [`Server::run`] so tests can bind to port 0 and read the
    /// actual address before serving.
    pub async fn serve(self, listener: TcpListener) -> Result<(), Box<dyn std::error::Error>> {
        let local_addr = listener.local_addr()?;

        // Start the periodic dead-connection sweep
        let reaper = spawn_reaper(
            self.registry.clone(),
            self.presence.clone(),
            self.reap_interval,
        );

        let app_state = Arc::new(AppState {
            connect_usecase: self.connect_usecase,
            disconnect_usecase: self.disconnect_usecase,
            route_event_usecase: self.route_event_usecase,
            registry: self.registry,
            presence: self.presence,
        });

        // Define handlers
        let app = Router::new()
            // WebSocket エンドポイント
            .route("/conversations", get(ws_root_handler))
            .route("/conversations/{conversation_id}", get(ws_conversation_handler))
            // HTTP エンドポイント
            .route("/api/health", get(health_check))
            .route("/debug/connections", get(debug_connections))
            .layer(TraceLayer::new_for_http())
            .with_state(app_state);

        // Start the server
        tracing::info!("Relay server listening on {}", local_addr);
        tracing::info!(
            "Connect to: ws://{}/conversations/{{conversation_id}}?userId=<user_id>",
            local_addr
        );
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        // Set up graceful shutdown signal handler
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        reaper.abort();
        tracing::info!("Server shutdown complete");

        Ok(())
    }
}
