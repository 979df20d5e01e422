//! Registry actor commands and errors.
//!
//! This module defines the message types for communicating with the `RegistryActor`:
//! - `RegistryCommand`: Commands sent to the actor
//! - `RegistryError`: Errors that can occur during registry operations
//! - `RegistryStats`: Point-in-time counters for diagnostics
//!
//! All types are designed for async message passing and follow the panic-free policy.

use pomo_core::{DomainError, SessionId, TimerSnapshot};
use pomo_protocol::ClientCommand;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::broadcast::{ConnectionId, Outbound};

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Request/response commands carry a oneshot channel for the reply,
/// enabling request-response patterns in async code without blocking.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Record a newly opened connection.
    ///
    /// The connection starts with no subscription. Everything the actor
    /// sends to it (snapshots, pongs) goes through `outbound`.
    Connect {
        connection_id: ConnectionId,
        outbound: Outbound,
    },

    /// Forget a closed connection.
    ///
    /// Clears its subscription. Session timers keep running.
    Disconnect { connection_id: ConnectionId },

    /// Apply a decoded client command on behalf of a connection.
    ///
    /// # Errors
    /// - `RegistryError::UnknownConnection` if the connection never connected
    /// - `RegistryError::SessionNotFound` if the command needs a joined session
    /// - `RegistryError::Domain` if the session rejects the transition
    Dispatch {
        connection_id: ConnectionId,
        command: ClientCommand,
        respond_to: oneshot::Sender<Result<(), RegistryError>>,
    },

    /// Get a session snapshot by ID.
    ///
    /// Returns `None` if the session doesn't exist.
    GetSession {
        session_id: SessionId,
        respond_to: oneshot::Sender<Option<TimerSnapshot>>,
    },

    /// Get the session a connection is subscribed to.
    GetSubscription {
        connection_id: ConnectionId,
        respond_to: oneshot::Sender<Option<SessionId>>,
    },

    /// Get registry counters.
    Stats {
        respond_to: oneshot::Sender<RegistryStats>,
    },
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
///
/// Every variant is reported to the originating connection as an `error`
/// message; none of them affect other connections or sessions.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// The connection has no subscription (no prior join).
    #[error("session not found: join a session first")]
    SessionNotFound,

    /// The connection was never registered with the actor.
    #[error("unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    /// The session rejected the transition.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The response channel was closed before receiving a response.
    ///
    /// This typically indicates the actor was shut down.
    #[error("response channel closed")]
    ChannelClosed,
}

// ============================================================================
// Registry Stats
// ============================================================================

/// Point-in-time registry counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Sessions ever created
    pub sessions: usize,

    /// Open connections
    pub connections: usize,

    /// Sessions with a live tick task
    pub ticking: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_error_display() {
        assert_eq!(
            RegistryError::SessionNotFound.to_string(),
            "session not found: join a session first"
        );
        assert_eq!(
            RegistryError::UnknownConnection(ConnectionId::new(4)).to_string(),
            "unknown connection: conn-4"
        );
        assert_eq!(RegistryError::ChannelClosed.to_string(), "response channel closed");

        let err: RegistryError = DomainError::AlreadyRunning {
            session_id: SessionId::new("abc"),
        }
        .into();
        assert_eq!(err.to_string(), "Timer already running for session abc");
    }

    #[tokio::test]
    async fn test_command_oneshot_pattern() {
        let (tx, rx) = oneshot::channel::<Result<(), RegistryError>>();

        tokio::spawn(async move {
            tx.send(Ok(())).ok();
        });

        let result = rx.await;
        assert!(result.is_ok());
        assert!(result.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_command_channel_closed_error() {
        let (tx, rx) = oneshot::channel::<Result<(), RegistryError>>();
        drop(tx);
        assert!(rx.await.is_err());
    }
}
