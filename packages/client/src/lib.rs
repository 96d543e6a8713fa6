//! CLI chat client for the Kakehashi relay.
//!
//! Connects to the relay as an optional user viewing an optional
//! conversation, sends stdin lines as `new_message` events, and renders the
//! envelopes the relay fans out.

mod error;
mod formatter;
mod runner;
mod session;
mod ui;

pub use error::ClientError;
pub use runner::run_client;
