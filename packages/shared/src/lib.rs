//! Shared utilities for the Kakehashi relay workspace.
//!
//! This crate carries the cross-cutting concerns used by both the server and
//! the CLI client: timestamp handling and logging setup.

pub mod logger;
pub mod time;
