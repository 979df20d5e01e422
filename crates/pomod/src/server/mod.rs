//! WebSocket server for the pomosync daemon.
//!
//! The server:
//! - Listens on a TCP socket for WebSocket clients
//! - Spawns a ConnectionHandler for each client
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   DaemonServer  │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionHandler│────▶│  RegistryHandle │
//! │   (per client)  │     │                 │
//! └─────────────────┘     └────────┬────────┘
//!         ▲                        │
//!         │ outbound queue         │ snapshots
//!         └────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Server errors are logged and allow continued operation

mod connection;

pub use connection::{ConnectionError, ConnectionHandler, MAX_BUFFERED_MESSAGE, MAX_MESSAGE_SIZE};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::broadcast::ConnectionId;
use crate::registry::RegistryHandle;

/// Default listen port
pub const DEFAULT_PORT: u16 = 8080;

/// Default per-connection outbound queue capacity
pub const DEFAULT_OUTBOUND_BUFFER: usize = 256;

/// WebSocket server for the pomosync daemon.
pub struct DaemonServer {
    /// Address to bind
    addr: SocketAddr,

    /// Handle to the session registry
    registry: RegistryHandle,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Connection counter for generating connection IDs
    connection_counter: AtomicU64,

    /// Capacity of each connection's outbound queue
    outbound_buffer: usize,
}

impl DaemonServer {
    /// Creates a new daemon server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Address the listener binds to
    /// * `registry` - Handle to the session registry
    /// * `cancel_token` - Token for graceful shutdown
    pub fn new(addr: SocketAddr, registry: RegistryHandle, cancel_token: CancellationToken) -> Self {
        Self {
            addr,
            registry,
            cancel_token,
            connection_counter: AtomicU64::new(0),
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
        }
    }

    /// Sets the per-connection outbound queue capacity.
    pub fn with_outbound_buffer(mut self, outbound_buffer: usize) -> Self {
        self.outbound_buffer = outbound_buffer;
        self
    }

    /// Runs the server.
    ///
    /// Binds the configured address and serves until the cancellation
    /// token is triggered. This method does not return until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: self.addr,
                error: e.to_string(),
            })?;

        self.serve(listener).await
    }

    /// Serves connections from an already-bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let local_addr = listener.local_addr().map_err(|e| ServerError::Bind {
            addr: self.addr,
            error: e.to_string(),
        })?;

        info!(addr = %local_addr, "Daemon server listening");

        // Accept connections until cancelled
        loop {
            tokio::select! {
                // Check for cancellation
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                // Accept new connection
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let conn_num = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, peer, ConnectionId::new(conn_num));
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            // Continue accepting other connections
                        }
                    }
                }
            }
        }

        info!("Server stopped accepting connections");
        Ok(())
    }

    /// Handles a new client connection by spawning a handler task.
    fn handle_connection(&self, stream: TcpStream, peer: SocketAddr, connection_id: ConnectionId) {
        let handler =
            ConnectionHandler::new(connection_id, peer, self.registry.clone(), self.outbound_buffer);
        let cancel = self.cancel_token.child_token();

        tokio::spawn(async move {
            if let Err(e) = handler.run(stream, cancel).await {
                debug!(connection_id = %connection_id, error = %e, "Connection ended with error");
            }
        });
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: SocketAddr, error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port() {
        assert_eq!(DEFAULT_PORT, 8080);
    }

    #[test]
    fn test_server_error_display() {
        let err = ServerError::Bind {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            error: "address in use".to_string(),
        };
        assert!(err.to_string().contains("127.0.0.1:8080"));
        assert!(err.to_string().contains("address in use"));
    }

    #[tokio::test]
    async fn test_bind_conflict_reports_address() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();

        let registry = crate::registry::spawn_registry(pomo_core::Presets::default());
        let server = DaemonServer::new(addr, registry, CancellationToken::new());

        let err = server.run().await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { .. }));
    }

    #[tokio::test]
    async fn test_serve_stops_on_cancel() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();

        let registry = crate::registry::spawn_registry(pomo_core::Presets::default());
        let server = DaemonServer::new(addr, registry, cancel.clone());

        cancel.cancel();
        assert!(server.serve(listener).await.is_ok());
    }
}
