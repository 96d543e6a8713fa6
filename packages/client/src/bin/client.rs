//! CLI chat client for the Kakehashi relay.
//!
//! Connects to the relay server, joins an optional conversation as an
//! optional user, sends stdin lines as chat messages, and renders presence,
//! typing, notification, and message envelopes.
//! Automatically reconnects on disconnection (max 5 attempts with 5 second
//! interval).
//!
//! Run with:
//! ```not_rust
//! cargo run --bin kakehashi-client -- --user-id alice --conversation-id c1
//! cargo run --bin kakehashi-client -- -u ws://127.0.0.1:8080
//! ```

use clap::Parser;

use kakehashi_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "kakehashi-client")]
#[command(about = "CLI chat client for the Kakehashi conversation relay", long_about = None)]
struct Args {
    /// Relay server base URL
    #[arg(short = 'u', long, default_value = "ws://127.0.0.1:8080")]
    url: String,

    /// User identifier to connect as (optional; anonymous when omitted)
    #[arg(long)]
    user_id: Option<String>,

    /// Conversation identifier to view (optional)
    #[arg(long)]
    conversation_id: Option<String>,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();

    // Run the client
    if let Err(e) = kakehashi_client::run_client(args.url, args.user_id, args.conversation_id).await
    {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}
