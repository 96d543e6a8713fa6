//! Data Transfer Objects (DTOs) for the relay.
//!
//! - `websocket`: WebSocket message DTOs (inbound classification and
//!   outbound envelopes)

pub mod websocket;
