//! Protocol message definitions
//!
//! Defines the structured response body the hub writes to clients. All
//! outbound frames are JSON-encoded text.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Protocol-related errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Structured response body sent to clients
///
/// Every outbound message carries a status string, a free-form data object
/// and a human-readable message. The liveness broadcast reuses this shape
/// with all three fields set to "pong"; existing clients depend on that
/// exact field set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseBody {
    /// Status discriminator, e.g. "pong"
    pub status: String,
    /// Payload object
    pub data: Value,
    /// Human-readable description
    pub message: String,
}

impl ResponseBody {
    /// Create a response body
    pub fn new(status: impl Into<String>, data: Value, message: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            data,
            message: message.into(),
        }
    }

    /// The fixed liveness payload broadcast to every connection
    pub fn pong() -> Self {
        Self::new("pong", json!({ "type": "pong" }), "pong")
    }

    /// Serialize the body to JSON text for transmission
    pub fn to_text(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}
