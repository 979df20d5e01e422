//! Connection handler for individual WebSocket clients.
//!
//! Each client connection gets its own `ConnectionHandler` that:
//! - Completes the WebSocket upgrade
//! - Registers an outbound queue with the registry
//! - Decodes incoming text frames into commands
//! - Routes commands to the registry and reports failures to the sender
//!
//! Writes to the socket happen on a separate forwarder task that drains
//! the outbound queue and sends keepalive pings. Everything addressed to
//! this client (snapshots, pongs, errors) goes through that one queue, so
//! it reaches the socket in the order it was produced.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Connection errors are logged and result in graceful disconnect

use std::net::SocketAddr;
use std::time::Duration;

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{interval_at, timeout, Instant};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async_with_config, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pomo_protocol::{decode_command, ClientCommand, ServerMessage};

use crate::broadcast::{ConnectionId, Outbound};
use crate::registry::{RegistryError, RegistryHandle};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Maximum inbound message size (64 KiB). Larger messages get an error
/// reply and the connection stays open.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Largest message the transport will buffer at all. Anything bigger
/// ends the connection before it is fully read.
pub const MAX_BUFFERED_MESSAGE: usize = 4 * MAX_MESSAGE_SIZE;

/// Time allowed for the WebSocket upgrade
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Read timeout for silent peers. Clients answer our pings, so a healthy
/// idle connection still produces frames well inside this window.
const READ_TIMEOUT: Duration = Duration::from_secs(90);

/// Write timeout (10 seconds)
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between server-initiated Ping frames
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Connection handler for a single client.
pub struct ConnectionHandler {
    /// Identifier assigned by the server
    connection_id: ConnectionId,

    /// Remote address, for logging
    peer: SocketAddr,

    /// Handle to the session registry
    registry: RegistryHandle,

    /// Capacity of the outbound queue
    outbound_buffer: usize,
}

impl ConnectionHandler {
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `connection_id` - Unique id for this connection
    /// * `peer` - Remote address of the TCP stream
    /// * `registry` - Handle to the session registry
    /// * `outbound_buffer` - Messages that may queue for this client before
    ///   further ones are dropped
    pub fn new(
        connection_id: ConnectionId,
        peer: SocketAddr,
        registry: RegistryHandle,
        outbound_buffer: usize,
    ) -> Self {
        Self {
            connection_id,
            peer,
            registry,
            outbound_buffer: outbound_buffer.max(1),
        }
    }

    /// Runs the connection handler.
    ///
    /// Upgrades the stream, then processes frames until the peer closes,
    /// the read times out, or `cancel` fires. The registry is always told
    /// about the disconnect once the connection has been registered.
    pub async fn run(
        self,
        stream: TcpStream,
        cancel: CancellationToken,
    ) -> Result<(), ConnectionError> {
        let ws = match timeout(
            HANDSHAKE_TIMEOUT,
            accept_async_with_config(stream, Some(websocket_config())),
        ).await {
            Ok(Ok(ws)) => ws,
            Ok(Err(e)) => return Err(ConnectionError::Handshake(e.to_string())),
            Err(_) => return Err(ConnectionError::HandshakeTimeout),
        };

        let (sink, mut source) = ws.split();
        let (outbound, outbound_rx) = mpsc::channel(self.outbound_buffer);

        self.registry
            .connect(self.connection_id, outbound.clone())
            .await?;

        info!(
            connection_id = %self.connection_id,
            peer = %self.peer,
            "Client connected"
        );

        let mut forwarder = tokio::spawn(forward_outbound(sink, outbound_rx, self.connection_id));

        let result = self.process_frames(&mut source, &outbound, &cancel).await;

        // Close our side of the queue; the actor's clone goes with the disconnect
        self.registry.disconnect(self.connection_id).await;
        drop(outbound);

        if timeout(WRITE_TIMEOUT, &mut forwarder).await.is_err() {
            forwarder.abort();
        }

        info!(connection_id = %self.connection_id, "Client disconnected");
        result
    }

    /// Main frame processing loop.
    async fn process_frames(
        &self,
        source: &mut futures::stream::SplitStream<WebSocketStream<TcpStream>>,
        outbound: &Outbound,
        cancel: &CancellationToken,
    ) -> Result<(), ConnectionError> {
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(connection_id = %self.connection_id, "Connection closing for shutdown");
                    return Ok(());
                }

                next = timeout(READ_TIMEOUT, source.next()) => next,
            };

            let msg = match next {
                Ok(Some(Ok(msg))) => msg,
                Ok(Some(Err(e))) => return Err(ConnectionError::Transport(e.to_string())),
                Ok(None) => {
                    debug!(connection_id = %self.connection_id, "Client stream ended");
                    return Ok(());
                }
                Err(_) => {
                    debug!(connection_id = %self.connection_id, "Connection timed out");
                    return Err(ConnectionError::Timeout);
                }
            };

            match msg {
                Message::Text(text) => self.handle_text(text.as_str(), outbound).await?,
                Message::Binary(data) => match std::str::from_utf8(&data) {
                    Ok(text) => self.handle_text(text, outbound).await?,
                    Err(_) => {
                        self.reply_error(outbound, "Malformed message: binary frame is not UTF-8")
                    }
                },
                Message::Close(_) => {
                    debug!(connection_id = %self.connection_id, "Client sent close frame");
                    return Ok(());
                }
                // Pings are answered by tungstenite; pongs only prove liveness
                _ => {}
            }
        }
    }

    /// Decodes and dispatches one inbound text message.
    ///
    /// Per-message failures are reported to this client and the connection
    /// stays open. Only a stopped registry ends the connection.
    async fn handle_text(&self, text: &str, outbound: &Outbound) -> Result<(), ConnectionError> {
        let command = match decode_frame(text) {
            Ok(command) => command,
            Err(message) => {
                warn!(
                    connection_id = %self.connection_id,
                    error = %message,
                    "Rejected inbound message"
                );
                self.reply_error(outbound, message);
                return Ok(());
            }
        };

        let command_type = command.type_name();
        match self.registry.dispatch(self.connection_id, command).await {
            Ok(()) => Ok(()),
            Err(RegistryError::ChannelClosed) => Err(RegistryError::ChannelClosed.into()),
            Err(e) => {
                debug!(
                    connection_id = %self.connection_id,
                    command = command_type,
                    error = %e,
                    "Command failed"
                );
                self.reply_error(outbound, e.to_string());
                Ok(())
            }
        }
    }

    /// Queues an `error` message for this client only.
    fn reply_error(&self, outbound: &Outbound, message: impl Into<String>) {
        let json = match serde_json::to_string(&ServerMessage::error(message)) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to serialize error response");
                return;
            }
        };

        if let Err(TrySendError::Full(_)) = outbound.try_send(json) {
            warn!(connection_id = %self.connection_id, "Outbound queue full, error dropped");
        }
    }
}

/// Transport limits for inbound frames.
fn websocket_config() -> WebSocketConfig {
    WebSocketConfig::default()
        .max_message_size(Some(MAX_BUFFERED_MESSAGE))
        .max_frame_size(Some(MAX_BUFFERED_MESSAGE))
}

/// Size-checks and decodes one inbound message.
///
/// Returns the text of the `error` reply on failure.
fn decode_frame(text: &str) -> Result<ClientCommand, String> {
    if text.len() > MAX_MESSAGE_SIZE {
        return Err(ConnectionError::MessageTooLarge {
            size: text.len(),
            max: MAX_MESSAGE_SIZE,
        }
        .to_string());
    }
    decode_command(text).map_err(|e| e.to_string())
}

/// Drains the outbound queue to the socket, pinging while idle.
///
/// Exits when the queue closes (sending a Close frame first) or when a
/// write fails or stalls past `WRITE_TIMEOUT`.
async fn forward_outbound(
    mut sink: WsSink,
    mut outbound_rx: mpsc::Receiver<String>,
    connection_id: ConnectionId,
) {
    let mut ping = interval_at(Instant::now() + PING_INTERVAL, PING_INTERVAL);

    loop {
        let frame = tokio::select! {
            msg = outbound_rx.recv() => match msg {
                Some(text) => Message::Text(text.into()),
                None => {
                    let _ = timeout(WRITE_TIMEOUT, sink.close()).await;
                    break;
                }
            },

            _ = ping.tick() => Message::Ping(Default::default()),
        };

        match timeout(WRITE_TIMEOUT, sink.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(connection_id = %connection_id, error = %e, "Write failed");
                break;
            }
            Err(_) => {
                warn!(connection_id = %connection_id, "Write timed out");
                break;
            }
        }
    }
}

/// Errors that can occur on a single connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("WebSocket handshake failed: {0}")]
    Handshake(String),

    #[error("WebSocket handshake timed out")]
    HandshakeTimeout,

    #[error("WebSocket error: {0}")]
    Transport(String),

    #[error("Read timeout")]
    Timeout,

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_frame_accepts_command() {
        assert_eq!(
            decode_frame(r#"{"type":"startTimer"}"#),
            Ok(ClientCommand::StartTimer)
        );
    }

    #[test]
    fn test_decode_frame_rejects_oversized() {
        let padding = "x".repeat(MAX_MESSAGE_SIZE);
        let text = format!(r#"{{"type":"ping","pad":"{padding}"}}"#);

        let err = decode_frame(&text).unwrap_err();
        assert!(err.starts_with("Message too large"));
        assert!(err.contains(&MAX_MESSAGE_SIZE.to_string()));
    }

    #[test]
    fn test_transport_buffers_are_bounded() {
        let config = websocket_config();
        assert_eq!(config.max_message_size, Some(MAX_BUFFERED_MESSAGE));
        assert_eq!(config.max_frame_size, Some(MAX_BUFFERED_MESSAGE));
    }

    #[test]
    fn test_decode_frame_reports_protocol_error() {
        let err = decode_frame("not json").unwrap_err();
        assert!(!err.is_empty());
    }

    #[test]
    fn test_connection_error_display() {
        let err = ConnectionError::MessageTooLarge { size: 70000, max: 65536 };
        assert_eq!(err.to_string(), "Message too large: 70000 bytes (max: 65536)");

        let err: ConnectionError = RegistryError::ChannelClosed.into();
        assert_eq!(err.to_string(), "Registry error: response channel closed");
    }
}
