//! WebSocket server implementation
//!
//! Accepts client connections, registers each one in the connection
//! registry under its session id, and pumps frames between the socket and
//! the registered handle.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::session::{ConnectionHandle, ConnectionRegistry, HeartbeatBroadcaster};

/// Configuration for the WebSocket server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind: String,
    /// Port to listen on
    pub port: u16,
}

impl ServerConfig {
    /// Create a new server configuration
    pub fn new(bind: String, port: u16) -> Self {
        Self { bind, port }
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

/// WebSocket server owning the connection registry and the heartbeat task
pub struct WebSocketServer {
    config: ServerConfig,
    registry: Arc<ConnectionRegistry>,
    shutdown_tx: broadcast::Sender<()>,
}

impl WebSocketServer {
    /// Create a new WebSocket server
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            registry: Arc::new(ConnectionRegistry::new()),
            shutdown_tx,
        }
    }

    /// The registry shared with connection tasks and the broadcaster
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Trigger server shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Run the WebSocket server
    ///
    /// Starts the heartbeat broadcaster, then accepts connections until a
    /// shutdown signal is received. The broadcaster is joined before this
    /// returns.
    pub async fn run(&self) -> anyhow::Result<()> {
        let addr = self.config.socket_addr();
        let listener = TcpListener::bind(&addr).await?;
        info!("WebSocket hub listening on ws://{}", addr);

        let heartbeat = HeartbeatBroadcaster::new(Arc::clone(&self.registry))
            .spawn(self.shutdown_tx.subscribe());

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let registry = Arc::clone(&self.registry);
                            let shutdown_rx = self.shutdown_tx.subscribe();

                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, peer_addr, registry, shutdown_rx).await {
                                    error!("Connection error from {}: {}", peer_addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping server");
                    break;
                }
            }
        }

        if let Err(e) = heartbeat.await {
            error!("Heartbeat broadcaster task failed: {}", e);
        }

        let remaining = self.registry.count().await;
        if remaining > 0 {
            info!("Shut down with {} sessions still registered", remaining);
        }

        Ok(())
    }
}

/// Handle a single WebSocket connection
///
/// Upgrades the stream, derives the session id from the handshake request
/// path (falling back to a fresh UUID), registers the connection and pumps
/// frames until the socket closes. The registry entry is removed on the way
/// out regardless of how the pump ended.
async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    debug!("New connection from {}", peer_addr);

    let mut request_path = None;
    let ws_stream = accept_hdr_async(stream, |req: &Request, resp: Response| {
        request_path = Some(req.uri().path().to_string());
        Ok(resp)
    })
    .await?;

    let session_id = request_path
        .as_deref()
        .and_then(session_id_from_path)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let (handle, mut outbound_rx, inbound_tx) = ConnectionHandle::pair();
    if registry.register(session_id.clone(), Arc::clone(&handle)).await.is_some() {
        debug!("Session {} displaced an earlier connection", session_id);
    }

    let result = pump_frames(
        ws_stream,
        &session_id,
        &handle,
        &mut outbound_rx,
        &inbound_tx,
        &mut shutdown_rx,
    )
    .await;

    registry.remove(&session_id, &handle).await;
    debug!("Connection from {} closed", peer_addr);
    result
}

/// Pump frames between the socket and the registered handle
async fn pump_frames(
    ws_stream: WebSocketStream<TcpStream>,
    session_id: &str,
    handle: &ConnectionHandle,
    outbound_rx: &mut mpsc::Receiver<String>,
    inbound_tx: &mpsc::Sender<Value>,
    shutdown_rx: &mut broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    loop {
        tokio::select! {
            outgoing = outbound_rx.recv() => {
                match outgoing {
                    Some(text) => ws_sender.send(Message::Text(text)).await?,
                    // Handle dropped, nothing can send here anymore
                    None => break,
                }
            }
            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if !forward_inbound(inbound_tx, session_id, &text) {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        warn!("Received binary frame from session {} ({} bytes), ignoring", session_id, data.len());
                    }
                    Some(Ok(Message::Ping(data))) => {
                        ws_sender.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        // Ignore pong frames
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Session {} requested close", session_id);
                        break;
                    }
                    Some(Ok(Message::Frame(_))) => {
                        // Raw frame, ignore
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error on session {}: {}", session_id, e);
                        break;
                    }
                    None => {
                        info!("Session {} connection closed", session_id);
                        break;
                    }
                }
            }
            _ = handle.wait_closed() => {
                info!("Close requested for session {}, closing connection", session_id);
                let _ = ws_sender.send(Message::Close(None)).await;
                break;
            }
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received, closing session {}", session_id);
                let _ = ws_sender.send(Message::Close(None)).await;
                break;
            }
        }
    }

    Ok(())
}

/// Forward one inbound text frame to the registered handle
///
/// Non-JSON frames are discarded. A full inbound channel drops the frame
/// instead of stalling the pump; the hub is transport-only and a client
/// nobody is receiving from must not be able to block its own pongs.
/// Returns false once the handle is gone.
fn forward_inbound(inbound_tx: &mpsc::Sender<Value>, session_id: &str, text: &str) -> bool {
    let value = match serde_json::from_str::<Value>(text) {
        Ok(value) => value,
        Err(e) => {
            warn!("Discarding non-JSON frame from session {}: {}", session_id, e);
            return true;
        }
    };

    match inbound_tx.try_send(value) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!("Inbound channel full for session {}, dropping frame", session_id);
            true
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

/// Derive a session id from a handshake request path
///
/// Takes the last non-empty path segment, so "/ws/abc" and "/abc" both
/// yield "abc". A bare "/" yields nothing and the caller generates an id.
fn session_id_from_path(path: &str) -> Option<String> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .next_back()
        .map(str::to_string)
}
