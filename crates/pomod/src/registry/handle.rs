//! Client interface for interacting with the RegistryActor.
//!
//! The `RegistryHandle` provides a cheap-to-clone interface for sending commands
//! to the registry actor.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Channel errors are mapped to `RegistryError::ChannelClosed`

use tokio::sync::{mpsc, oneshot};

use pomo_core::{SessionId, TimerSnapshot};
use pomo_protocol::ClientCommand;

use super::commands::{RegistryCommand, RegistryError, RegistryStats};
use crate::broadcast::{ConnectionId, Outbound};

// ============================================================================
// Registry Handle
// ============================================================================

/// Handle for interacting with the registry actor.
///
/// This is a cheap-to-clone handle that can be shared across tasks.
/// All methods are async and communicate with the actor via channels.
///
/// # Usage
///
/// ```ignore
/// let (tx, mut rx) = mpsc::channel(256);
/// handle.connect(conn, tx).await?;
///
/// handle.dispatch(conn, ClientCommand::join("abc")).await?;
/// handle.dispatch(conn, ClientCommand::StartTimer).await?;
///
/// while let Some(json) = rx.recv().await {
///     // Forward to the socket
/// }
/// ```
#[derive(Clone)]
pub struct RegistryHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    /// Create a new registry handle.
    ///
    /// # Arguments
    ///
    /// * `sender` - The command channel sender for communicating with the actor
    pub fn new(sender: mpsc::Sender<RegistryCommand>) -> Self {
        Self { sender }
    }

    /// Attach a connection's outbound queue.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn connect(
        &self,
        connection_id: ConnectionId,
        outbound: Outbound,
    ) -> Result<(), RegistryError> {
        self.sender
            .send(RegistryCommand::Connect {
                connection_id,
                outbound,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)
    }

    /// Detach a connection.
    ///
    /// This is a fire-and-forget operation; the connection is going away
    /// regardless of whether the actor is still running.
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        let _ = self
            .sender
            .send(RegistryCommand::Disconnect { connection_id })
            .await;
    }

    /// Apply a client command on behalf of a connection.
    ///
    /// Resolves once the command has been applied and any resulting
    /// broadcast queued. Replies (snapshots, pongs) travel through the
    /// connection's outbound queue, not through this return value.
    ///
    /// # Errors
    ///
    /// - `RegistryError::SessionNotFound` if the command needs a joined session
    /// - `RegistryError::Domain` if the session rejects the transition
    /// - `RegistryError::UnknownConnection` if `connect` was never called
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn dispatch(
        &self,
        connection_id: ConnectionId,
        command: ClientCommand,
    ) -> Result<(), RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Dispatch {
                connection_id,
                command,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Get a single session snapshot by ID.
    ///
    /// Returns `None` if the session doesn't exist or if communication
    /// with the actor fails.
    pub async fn get_session(&self, session_id: SessionId) -> Option<TimerSnapshot> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::GetSession {
                session_id,
                respond_to: tx,
            })
            .await
            .ok()?;

        rx.await.ok()?
    }

    /// Get the session a connection is subscribed to.
    pub async fn subscription(&self, connection_id: ConnectionId) -> Option<SessionId> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::GetSubscription {
                connection_id,
                respond_to: tx,
            })
            .await
            .ok()?;

        rx.await.ok()?
    }

    /// Get registry counters.
    ///
    /// Returns zeroed stats if communication with the actor fails.
    pub async fn stats(&self) -> RegistryStats {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Stats { respond_to: tx })
            .await
            .is_err()
        {
            return RegistryStats::default();
        }

        rx.await.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_handle() -> (RegistryHandle, mpsc::Receiver<RegistryCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        (RegistryHandle::new(cmd_tx), cmd_rx)
    }

    #[tokio::test]
    async fn test_handle_is_clone() {
        let (handle, _rx) = create_test_handle();
        let _cloned = handle.clone();
        // Compiles = test passes
    }

    #[tokio::test]
    async fn test_dispatch_sends_command() {
        let (handle, mut rx) = create_test_handle();

        // Spawn task to handle the command
        let cmd_handler = tokio::spawn(async move {
            if let Some(RegistryCommand::Dispatch {
                connection_id,
                command,
                respond_to,
            }) = rx.recv().await
            {
                assert_eq!(connection_id, ConnectionId::new(3));
                assert_eq!(command, ClientCommand::join("abc"));
                let _ = respond_to.send(Ok(()));
                return true;
            }
            false
        });

        let result = handle
            .dispatch(ConnectionId::new(3), ClientCommand::join("abc"))
            .await;
        assert!(result.is_ok());
        assert!(cmd_handler.await.unwrap());
    }

    #[tokio::test]
    async fn test_dispatch_forwards_actor_error() {
        let (handle, mut rx) = create_test_handle();

        tokio::spawn(async move {
            if let Some(RegistryCommand::Dispatch { respond_to, .. }) = rx.recv().await {
                let _ = respond_to.send(Err(RegistryError::SessionNotFound));
            }
        });

        let result = handle
            .dispatch(ConnectionId::new(1), ClientCommand::StartTimer)
            .await;
        assert!(matches!(result, Err(RegistryError::SessionNotFound)));
    }

    #[tokio::test]
    async fn test_dispatch_channel_closed_error() {
        let (handle, rx) = create_test_handle();
        drop(rx); // Close the channel

        let result = handle
            .dispatch(ConnectionId::new(1), ClientCommand::Ping)
            .await;
        assert!(matches!(result, Err(RegistryError::ChannelClosed)));
    }

    #[tokio::test]
    async fn test_dispatch_dropped_responder_error() {
        let (handle, mut rx) = create_test_handle();

        tokio::spawn(async move {
            // Receive and drop without responding
            let _ = rx.recv().await;
        });

        let result = handle
            .dispatch(ConnectionId::new(1), ClientCommand::Ping)
            .await;
        assert!(matches!(result, Err(RegistryError::ChannelClosed)));
    }

    #[tokio::test]
    async fn test_connect_channel_closed_error() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        let (tx, _out) = mpsc::channel(1);
        let result = handle.connect(ConnectionId::new(1), tx).await;
        assert!(matches!(result, Err(RegistryError::ChannelClosed)));
    }

    #[tokio::test]
    async fn test_disconnect_fire_and_forget() {
        let (handle, mut rx) = create_test_handle();

        let cmd_handler = tokio::spawn(async move {
            matches!(
                rx.recv().await,
                Some(RegistryCommand::Disconnect { connection_id }) if connection_id == ConnectionId::new(5)
            )
        });

        handle.disconnect(ConnectionId::new(5)).await;
        assert!(cmd_handler.await.unwrap());
    }

    #[tokio::test]
    async fn test_disconnect_ignores_closed_channel() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        // Should not panic or error
        handle.disconnect(ConnectionId::new(1)).await;
    }

    #[tokio::test]
    async fn test_get_session_returns_none_on_channel_close() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        let result = handle.get_session(SessionId::new("abc")).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_stats_default_on_channel_close() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        assert_eq!(handle.stats().await, RegistryStats::default());
    }
}
