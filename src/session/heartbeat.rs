//! Heartbeat broadcaster
//!
//! Background task that sends a "pong" liveness payload to every registered
//! connection on a fixed interval, so clients can tell the server is alive
//! without sending anything themselves.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::ConnectionRegistry;
use crate::server::ResponseBody;

/// Fixed period between liveness broadcasts
pub const HEARTBEAT_PERIOD: Duration = Duration::from_secs(20);

/// Periodic best-effort liveness broadcaster
///
/// Owned by the server: spawned once at startup, cancelled through the
/// shared shutdown signal, and joined during graceful shutdown.
pub struct HeartbeatBroadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl HeartbeatBroadcaster {
    /// Create a broadcaster over the given registry
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Spawn the broadcast loop
    ///
    /// Runs one cycle immediately, then every `HEARTBEAT_PERIOD` until the
    /// shutdown signal fires. The returned handle is awaited on shutdown.
    pub fn spawn(self, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        info!("Starting heartbeat broadcaster ({}s period)", HEARTBEAT_PERIOD.as_secs());

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEARTBEAT_PERIOD);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.broadcast_cycle().await;
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Heartbeat broadcaster stopping");
                        break;
                    }
                }
            }
        })
    }

    /// Run one broadcast cycle over a snapshot of the current membership
    ///
    /// Each send is isolated and non-blocking: a closed or congested
    /// connection is logged and the cycle continues with the remaining
    /// sessions. A stuck pump with a full outbound channel therefore costs
    /// that session one pong, never the whole broadcast. Eviction of dead
    /// entries stays with the owning connection task.
    pub async fn broadcast_cycle(&self) {
        let entries = self.registry.snapshot().await;
        info!("Pong broadcast for {} active connections", entries.len());

        let payload = match ResponseBody::pong().to_text() {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize pong payload: {}", e);
                return;
            }
        };

        for (session_id, handle) in entries {
            if let Err(e) = handle.try_send_text(payload.clone()) {
                warn!("Pong to session {} failed: {}", session_id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ConnectionHandle;
    use serde_json::Value;

    fn parse(text: &str) -> Value {
        serde_json::from_str(text).unwrap()
    }

    #[tokio::test]
    async fn test_cycle_delivers_pong_to_every_session() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (a, mut a_rx, _a_tx) = ConnectionHandle::pair();
        let (b, mut b_rx, _b_tx) = ConnectionHandle::pair();
        registry.register("a", a).await;
        registry.register("b", b).await;

        let broadcaster = HeartbeatBroadcaster::new(Arc::clone(&registry));
        broadcaster.broadcast_cycle().await;

        for rx in [&mut a_rx, &mut b_rx] {
            let pong = parse(&rx.try_recv().unwrap());
            assert_eq!(pong["status"], "pong");
            assert_eq!(pong["data"]["type"], "pong");
            assert_eq!(pong["message"], "pong");
            assert_eq!(pong.as_object().unwrap().len(), 3);
            assert_eq!(pong["data"].as_object().unwrap().len(), 1);
            // Exactly one pong per cycle
            assert!(rx.try_recv().is_err());
        }
    }

    #[tokio::test]
    async fn test_removed_session_receives_nothing() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (handle, mut rx, _tx) = ConnectionHandle::pair();
        registry.register("a", Arc::clone(&handle)).await;

        let broadcaster = HeartbeatBroadcaster::new(Arc::clone(&registry));
        broadcaster.broadcast_cycle().await;
        assert!(rx.try_recv().is_ok());

        registry.remove("a", &handle).await;
        broadcaster.broadcast_cycle().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stuck_connection_does_not_wedge_cycle() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (stuck, _stuck_rx, _stuck_tx) = ConnectionHandle::pair();
        let (live, mut live_rx, _live_tx) = ConnectionHandle::pair();

        // Open connection whose pump is not draining: fill the outbound
        // channel to capacity without dropping the receiver
        for i in 0..crate::session::CHANNEL_CAPACITY {
            stuck.try_send_text(format!("backlog-{}", i)).unwrap();
        }
        registry.register("stuck", stuck).await;
        registry.register("live", live).await;

        let broadcaster = HeartbeatBroadcaster::new(Arc::clone(&registry));
        tokio::time::timeout(Duration::from_secs(2), broadcaster.broadcast_cycle())
            .await
            .expect("cycle must not wait on a congested connection");

        let pong = parse(&live_rx.try_recv().unwrap());
        assert_eq!(pong["status"], "pong");
    }

    #[tokio::test]
    async fn test_dead_connection_does_not_starve_survivors() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (dead, dead_rx, _dead_tx) = ConnectionHandle::pair();
        let (live, mut live_rx, _live_tx) = ConnectionHandle::pair();
        registry.register("dead", dead).await;
        registry.register("live", live).await;
        drop(dead_rx);

        let broadcaster = HeartbeatBroadcaster::new(Arc::clone(&registry));
        broadcaster.broadcast_cycle().await;

        let pong = parse(&live_rx.try_recv().unwrap());
        assert_eq!(pong["status"], "pong");
    }

    #[tokio::test]
    async fn test_shutdown_stops_broadcast_task() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = HeartbeatBroadcaster::new(registry).spawn(shutdown_rx);
        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("broadcaster must stop on shutdown signal")
            .unwrap();
    }
}
