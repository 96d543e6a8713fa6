//! Error types for the CLI chat client.

use thiserror::Error;

/// Client-specific errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection error (handshake failure, connection refused, ...)
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Failed to send a message over the open connection
    #[error("Failed to send message: {0}")]
    SendError(String),
}
