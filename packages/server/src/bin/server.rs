//! Real-time conversation relay server.
//!
//! Holds live WebSocket connections, fans chat events out to connected
//! peers, and hands missed-event notifications to an external persistence
//! API (fire-and-forget).
//!
//! Run with:
//! ```not_rust
//! cargo run --bin kakehashi-server
//! cargo run --bin kakehashi-server -- --host 0.0.0.0 --port 3000 \
//!     --api-base-url http://localhost:3001
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::Mutex;

use kakehashi_server::{
    domain::PresenceRoster,
    infrastructure::{api::HttpApiClient, broadcast::Broadcaster, registry::ConnectionRegistry},
    ui::Server,
    usecase::{ConnectUseCase, DisconnectUseCase, NotificationDispatcher, RouteEventUseCase},
};
use kakehashi_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "kakehashi-server")]
#[command(about = "Real-time conversation relay server", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,

    /// Base URL of the persistence API (notifications, user activity,
    /// participant directory). Falls back to the KAKEHASHI_API_BASE_URL
    /// environment variable; when neither is set, notification persistence
    /// is disabled (logged, never fatal).
    #[arg(long)]
    api_base_url: Option<String>,

    /// Interval in seconds between dead-connection sweeps
    #[arg(long, default_value = "30")]
    reap_interval_secs: u64,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();

    // Initialize dependencies in order:
    // 1. External API client (participant directory + notification store)
    // 2. Registry / presence / broadcaster
    // 3. UseCases
    // 4. Server

    // 1. External API client
    let api_base_url = args
        .api_base_url
        .or_else(|| std::env::var("KAKEHASHI_API_BASE_URL").ok());
    let api_client = Arc::new(HttpApiClient::new(api_base_url));

    // 2. Connection state
    let registry = Arc::new(ConnectionRegistry::new());
    let presence = Arc::new(Mutex::new(PresenceRoster::new()));
    let broadcaster = Broadcaster::new(registry.clone());

    // 3. UseCases
    let dispatcher = Arc::new(NotificationDispatcher::new(
        api_client.clone(),
        api_client.clone(),
    ));
    let connect_usecase = Arc::new(ConnectUseCase::new(
        registry.clone(),
        presence.clone(),
        broadcaster.clone(),
    ));
    let disconnect_usecase = Arc::new(DisconnectUseCase::new(
        registry.clone(),
        presence.clone(),
        broadcaster.clone(),
    ));
    let route_event_usecase = Arc::new(RouteEventUseCase::new(
        registry.clone(),
        broadcaster,
        dispatcher,
    ));

    // 4. Create and run the server
    let server = Server::new(
        connect_usecase,
        disconnect_usecase,
        route_event_usecase,
        registry,
        presence,
        Duration::from_secs(args.reap_interval_secs),
    );
    if let Err(e) = server.run(args.host, args.port).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
