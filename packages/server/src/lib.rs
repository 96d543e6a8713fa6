//! Real-time conversation relay library.
//!
//! This library holds live WebSocket connections, tracks which user is
//! viewing which conversation, fans chat events out to the right set of
//! connected peers, and triggers best-effort notification persistence for
//! events a recipient may have missed while disconnected.

// layers
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;
