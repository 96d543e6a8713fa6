//! Logging setup utilities for the Kakehashi relay workspace.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber with the specified default log level.
///
/// The default filter covers the workspace crates plus `tower_http` (request
/// traces on the server). The whole filter can be overridden with the
/// `RUST_LOG` environment variable.
///
/// # Arguments
///
/// * `binary_name` - The name of the binary (e.g., "kakehashi-server")
/// * `default_level` - The default log level (e.g., "debug", "info", "warn")
///
/// # Examples
///
/// ```no_run
/// use kakehashi_shared::logger::setup_logger;
///
/// setup_logger("kakehashi-server", "info");
/// ```
pub fn setup_logger(binary_name: &str, default_log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(binary_name, default_log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build the default EnvFilter directive string for a binary.
fn default_filter(binary_name: &str, level: &str) -> String {
    format!(
        "kakehashi_shared={level},kakehashi_server={level},kakehashi_client={level},tower_http={level},{bin}={level}",
        level = level,
        bin = binary_name.replace("-", "_"),
    )
}
