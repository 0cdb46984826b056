//! WebSocket server module
//!
//! Handles incoming WebSocket connections and defines the outbound message
//! format.

mod protocol;
mod websocket;

pub use protocol::*;
pub use websocket::*;
