//! Session management module
//!
//! Holds the connection registry that maps session ids to live WebSocket
//! handles, and the heartbeat broadcaster that pings every registered
//! connection on a fixed interval.

mod handle;
mod heartbeat;
mod registry;

pub use handle::*;
pub use heartbeat::*;
pub use registry::*;
