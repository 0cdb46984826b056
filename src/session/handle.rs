//! Connection handle
//!
//! An opaque capability for one open bidirectional WebSocket connection.
//! The socket pump task owns the actual split sink/stream; the handle talks
//! to it over bounded channels, so the registry never touches the wire
//! directly.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex, Notify};

/// Capacity of the per-connection outbound and inbound channels
pub const CHANNEL_CAPACITY: usize = 64;

/// Errors that can occur on the connection transport
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection transport closed")]
    Closed,

    #[error("Connection transport congested")]
    Congested,
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Handle to one live connection
///
/// Outbound text frames go to the pump task through `outbound`; parsed
/// inbound messages arrive on `inbound`. The receiver is behind a mutex so
/// `receive_json` can take `&self` while still consuming messages.
pub struct ConnectionHandle {
    outbound: mpsc::Sender<String>,
    inbound: Mutex<mpsc::Receiver<Value>>,
    closed: Notify,
}

impl ConnectionHandle {
    /// Create a handle together with the pump-side channel ends
    ///
    /// Returns the handle, the receiver the pump drains for outgoing text,
    /// and the sender the pump feeds with parsed inbound messages. Tests use
    /// the same constructor to build mock connections.
    pub fn pair() -> (Arc<Self>, mpsc::Receiver<String>, mpsc::Sender<Value>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let handle = Arc::new(Self {
            outbound: outbound_tx,
            inbound: Mutex::new(inbound_rx),
            closed: Notify::new(),
        });

        (handle, outbound_rx, inbound_tx)
    }

    /// Queue one text frame for transmission
    ///
    /// Waits for channel space when the pump is slow; fails when the pump
    /// task has gone away (socket closed or errored).
    pub async fn send_text(&self, text: String) -> TransportResult<()> {
        self.outbound
            .send(text)
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Queue one text frame without waiting
    ///
    /// Fails with `Congested` when the outbound channel is full instead of
    /// waiting for the pump to drain it. Used by the heartbeat broadcaster,
    /// which must never park on a stuck connection.
    pub fn try_send_text(&self, text: String) -> TransportResult<()> {
        self.outbound.try_send(text).map_err(|e| match e {
            TrySendError::Full(_) => TransportError::Congested,
            TrySendError::Closed(_) => TransportError::Closed,
        })
    }

    /// Await one parsed inbound message
    ///
    /// Suspends until a message arrives or the transport closes.
    pub async fn receive_json(&self) -> TransportResult<Value> {
        let mut inbound = self.inbound.lock().await;
        inbound.recv().await.ok_or(TransportError::Closed)
    }

    /// Ask the owning pump to close the connection
    ///
    /// The signal is stored, so it is not lost when the pump is not yet
    /// waiting on `wait_closed`.
    pub fn close(&self) {
        self.closed.notify_one();
    }

    /// Resolves once `close` has been called
    pub async fn wait_closed(&self) {
        self.closed.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_send_reaches_pump() {
        let (handle, mut outbound_rx, _inbound_tx) = ConnectionHandle::pair();
        handle.send_text("hello".to_string()).await.unwrap();
        assert_eq!(outbound_rx.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_send_fails_when_pump_gone() {
        let (handle, outbound_rx, _inbound_tx) = ConnectionHandle::pair();
        drop(outbound_rx);
        let result = handle.send_text("hello".to_string()).await;
        assert!(matches!(result, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_try_send_fails_when_congested() {
        let (handle, _outbound_rx, _inbound_tx) = ConnectionHandle::pair();
        for i in 0..CHANNEL_CAPACITY {
            handle.try_send_text(format!("frame-{}", i)).unwrap();
        }
        // Channel full but still open: must fail immediately, not wait
        let result = handle.try_send_text("overflow".to_string());
        assert!(matches!(result, Err(TransportError::Congested)));
    }

    #[tokio::test]
    async fn test_try_send_fails_when_pump_gone() {
        let (handle, outbound_rx, _inbound_tx) = ConnectionHandle::pair();
        drop(outbound_rx);
        let result = handle.try_send_text("hello".to_string());
        assert!(matches!(result, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_receive_yields_parsed_message() {
        let (handle, _outbound_rx, inbound_tx) = ConnectionHandle::pair();
        inbound_tx.send(json!({"op": "noop"})).await.unwrap();
        let msg = handle.receive_json().await.unwrap();
        assert_eq!(msg["op"], "noop");
    }

    #[tokio::test]
    async fn test_receive_fails_when_transport_closed() {
        let (handle, _outbound_rx, inbound_tx) = ConnectionHandle::pair();
        drop(inbound_tx);
        let result = handle.receive_json().await;
        assert!(matches!(result, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_close_signal_is_not_lost() {
        let (handle, _outbound_rx, _inbound_tx) = ConnectionHandle::pair();
        // Signal before anyone waits; wait_closed must still resolve
        handle.close();
        tokio::time::timeout(Duration::from_millis(100), handle.wait_closed())
            .await
            .expect("close signal must be stored until the pump waits");
    }
}
