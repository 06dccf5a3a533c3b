//! Wire types for the realtime model protocol.

pub mod client_events;
pub mod models;
pub mod server_events;
