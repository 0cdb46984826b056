//! Connection registry
//!
//! Maintains the process-wide mapping from session id to live connection
//! handle. The sole source of truth for "who is connected right now".
//! All membership reads and writes go through one RwLock so the heartbeat
//! broadcaster can snapshot safely while connection tasks register and
//! remove entries.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use super::{ConnectionHandle, TransportError};

/// Errors that can occur during registry operations
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Session {0} is not connected, send failed")]
    SendNotConnected(String),

    #[error("Session {0} is not connected, receive failed")]
    ReceiveNotConnected(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Registry of live connections keyed by session id
///
/// At most one handle per session id at any instant. Registering an id that
/// is already present replaces the old entry; removal only evicts when the
/// caller still holds the registered handle, so a stale disconnect cannot
/// tear down a replacement connection.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, Arc<ConnectionHandle>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a ready-to-use connection under a session id
    ///
    /// An id that is already registered gets its entry replaced; the
    /// displaced handle is signalled to close so its pump tears the old
    /// socket down, and is returned to the caller.
    pub async fn register(
        &self,
        session_id: impl Into<String>,
        handle: Arc<ConnectionHandle>,
    ) -> Option<Arc<ConnectionHandle>> {
        let session_id = session_id.into();
        let replaced = {
            let mut connections = self.connections.write().await;
            connections.insert(session_id.clone(), handle)
        };

        if let Some(old) = &replaced {
            old.close();
            info!("Session {} reconnected, replacing previous handle", session_id);
        } else {
            info!("Session {} connected", session_id);
        }
        replaced
    }

    /// Remove the exact (session id, handle) pair
    ///
    /// A no-op when the id is absent or the registered handle is a different
    /// allocation than the one passed in.
    pub async fn remove(&self, session_id: &str, handle: &Arc<ConnectionHandle>) {
        let removed = {
            let mut connections = self.connections.write().await;
            match connections.get(session_id) {
                Some(current) if Arc::ptr_eq(current, handle) => {
                    connections.remove(session_id);
                    true
                }
                _ => false,
            }
        };

        if removed {
            info!("Session {} removed from active connections", session_id);
        } else {
            debug!("Session {} not registered with this handle, remove skipped", session_id);
        }
    }

    /// Check whether a session id is currently registered
    pub async fn exists(&self, session_id: &str) -> bool {
        self.connections.read().await.contains_key(session_id)
    }

    /// Get the handle registered under a session id
    pub async fn lookup(&self, session_id: &str) -> Option<Arc<ConnectionHandle>> {
        self.connections.read().await.get(session_id).cloned()
    }

    /// Number of active connections
    pub async fn count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Snapshot the current membership
    ///
    /// Clones the (id, handle) pairs under the read lock so callers can
    /// iterate without holding it.
    pub async fn snapshot(&self) -> Vec<(String, Arc<ConnectionHandle>)> {
        let connections = self.connections.read().await;
        connections
            .iter()
            .map(|(id, handle)| (id.clone(), Arc::clone(handle)))
            .collect()
    }

    /// Send a text payload to a session
    ///
    /// Fails with `SendNotConnected` when the id has no registered handle;
    /// transport failures propagate to the caller untranslated.
    pub async fn send(&self, session_id: &str, text: String) -> RegistryResult<()> {
        let handle = match self.lookup(session_id).await {
            Some(handle) => handle,
            None => {
                error!("Session {} is not connected, send failed", session_id);
                return Err(RegistryError::SendNotConnected(session_id.to_string()));
            }
        };

        handle.send_text(text).await?;
        Ok(())
    }

    /// Await one parsed message from a session
    ///
    /// Fails with `ReceiveNotConnected` without suspending when the id has
    /// no registered handle; otherwise blocks until a message arrives or the
    /// transport fails.
    pub async fn receive(&self, session_id: &str) -> RegistryResult<Value> {
        let handle = match self.lookup(session_id).await {
            Some(handle) => handle,
            None => {
                error!("Session {} is not connected, receive failed", session_id);
                return Err(RegistryError::ReceiveNotConnected(session_id.to_string()));
            }
        };

        let message = handle.receive_json().await?;
        info!("Received message from session {}", session_id);
        Ok(message)
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
