//! Connection subscriptions and snapshot fan-out.
//!
//! The `Broadcaster` owns one record per open connection: the queue that
//! feeds the connection's socket writer, and the session the connection is
//! subscribed to (at most one). It lives inside the registry actor, so
//! subscriptions change only on the actor's event queue.
//!
//! Delivery never blocks: each message is offered to the connection's
//! bounded queue with `try_send`. A full or closed queue drops the message
//! for that connection only; there is no retry. Clients converge on the
//! next broadcast, and a join always returns a full snapshot.

use std::collections::HashMap;
use std::fmt;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, trace, warn};

use pomo_core::SessionId;
use pomo_protocol::ServerMessage;

use crate::registry::SessionStore;

/// Sender half of a connection's outbound queue (serialized JSON text).
pub type Outbound = mpsc::Sender<String>;

/// Identifier the server assigns to each accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Per-connection record.
struct Subscriber {
    outbound: Outbound,
    session: Option<SessionId>,
}

/// Result of offering one message to one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Message queued for the socket writer
    Queued,

    /// Queue full; message dropped
    Dropped,

    /// Connection unknown or its writer has gone away
    Closed,
}

/// Subscription table and fan-out.
#[derive(Default)]
pub struct Broadcaster {
    subscribers: HashMap<ConnectionId, Subscriber>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a newly opened connection with no subscription.
    ///
    /// Re-registering an id replaces its queue and clears its subscription.
    pub fn register(&mut self, connection_id: ConnectionId, outbound: Outbound) {
        self.subscribers.insert(
            connection_id,
            Subscriber {
                outbound,
                session: None,
            },
        );
        debug!(connection_id = %connection_id, "Connection registered");
    }

    /// Forgets a connection. Returns the subscription it held, if any.
    pub fn unregister(&mut self, connection_id: ConnectionId) -> Option<SessionId> {
        self.subscribers
            .remove(&connection_id)
            .and_then(|sub| sub.session)
    }

    pub fn is_registered(&self, connection_id: ConnectionId) -> bool {
        self.subscribers.contains_key(&connection_id)
    }

    /// Returns the session a connection is subscribed to.
    pub fn subscription(&self, connection_id: ConnectionId) -> Option<&SessionId> {
        self.subscribers
            .get(&connection_id)
            .and_then(|sub| sub.session.as_ref())
    }

    /// Points a connection at `session_id`, returning the previous
    /// subscription. Unknown connections are ignored.
    pub fn subscribe(
        &mut self,
        connection_id: ConnectionId,
        session_id: SessionId,
    ) -> Option<SessionId> {
        self.subscribers
            .get_mut(&connection_id)
            .and_then(|sub| sub.session.replace(session_id))
    }

    /// Clears a connection's subscription, returning what it was.
    pub fn unsubscribe(&mut self, connection_id: ConnectionId) -> Option<SessionId> {
        self.subscribers
            .get_mut(&connection_id)
            .and_then(|sub| sub.session.take())
    }

    /// Number of open connections.
    pub fn connection_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Number of connections subscribed to `session_id`.
    pub fn subscriber_count(&self, session_id: &SessionId) -> usize {
        self.subscribers
            .values()
            .filter(|sub| sub.session.as_ref() == Some(session_id))
            .count()
    }

    /// Sends a message to a single connection.
    pub fn send_to(&self, connection_id: ConnectionId, msg: &ServerMessage) -> Delivery {
        let Some(sub) = self.subscribers.get(&connection_id) else {
            return Delivery::Closed;
        };
        match serialize(msg) {
            Some(json) => offer(connection_id, &sub.outbound, json),
            None => Delivery::Dropped,
        }
    }

    /// Sends the current snapshot of `session_id` to every connection
    /// subscribed to it.
    ///
    /// No-op if the session is unknown. Returns the number of connections
    /// the snapshot was queued for.
    pub fn broadcast(&self, store: &SessionStore, session_id: &SessionId) -> usize {
        let Some(entry) = store.get(session_id) else {
            trace!(session_id = %session_id, "Broadcast for unknown session skipped");
            return 0;
        };

        // Build the message once
        let Some(json) = serialize(&ServerMessage::timer(entry.snapshot())) else {
            return 0;
        };

        let mut queued = 0;
        for (connection_id, sub) in &self.subscribers {
            if sub.session.as_ref() != Some(session_id) {
                continue;
            }
            if offer(*connection_id, &sub.outbound, json.clone()) == Delivery::Queued {
                queued += 1;
            }
        }

        trace!(session_id = %session_id, queued, "Snapshot broadcast");
        queued
    }
}

fn serialize(msg: &ServerMessage) -> Option<String> {
    match serde_json::to_string(msg) {
        Ok(json) => Some(json),
        Err(e) => {
            error!(error = %e, "Failed to serialize message");
            None
        }
    }
}

fn offer(connection_id: ConnectionId, outbound: &Outbound, json: String) -> Delivery {
    match outbound.try_send(json) {
        Ok(()) => Delivery::Queued,
        Err(TrySendError::Full(_)) => {
            warn!(connection_id = %connection_id, "Outbound queue full, message dropped");
            Delivery::Dropped
        }
        Err(TrySendError::Closed(_)) => {
            debug!(connection_id = %connection_id, "Outbound queue closed");
            Delivery::Closed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pomo_core::Presets;

    fn outbound(capacity: usize) -> (Outbound, mpsc::Receiver<String>) {
        mpsc::channel(capacity)
    }

    fn store_with(ids: &[&str]) -> SessionStore {
        let mut store = SessionStore::new(Presets::default());
        for id in ids {
            store.get_or_create(&SessionId::new(*id));
        }
        store
    }

    #[test]
    fn test_connection_id_display() {
        assert_eq!(ConnectionId::new(7).to_string(), "conn-7");
    }

    #[test]
    fn test_subscribe_replaces_previous() {
        let mut broadcaster = Broadcaster::new();
        let (tx, _rx) = outbound(4);
        let conn = ConnectionId::new(1);
        broadcaster.register(conn, tx);

        assert_eq!(broadcaster.subscribe(conn, SessionId::new("a")), None);
        assert_eq!(
            broadcaster.subscribe(conn, SessionId::new("b")),
            Some(SessionId::new("a"))
        );
        assert_eq!(broadcaster.subscription(conn), Some(&SessionId::new("b")));
        assert_eq!(broadcaster.unsubscribe(conn), Some(SessionId::new("b")));
        assert_eq!(broadcaster.subscription(conn), None);
    }

    #[test]
    fn test_subscribe_unknown_connection_is_ignored() {
        let mut broadcaster = Broadcaster::new();
        assert_eq!(broadcaster.subscribe(ConnectionId::new(9), SessionId::new("a")), None);
        assert_eq!(broadcaster.subscription(ConnectionId::new(9)), None);
    }

    #[test]
    fn test_broadcast_reaches_only_matching_subscribers() {
        let mut broadcaster = Broadcaster::new();
        let store = store_with(&["a", "b"]);

        let (tx1, mut rx1) = outbound(4);
        let (tx2, mut rx2) = outbound(4);
        let (tx3, mut rx3) = outbound(4);
        broadcaster.register(ConnectionId::new(1), tx1);
        broadcaster.register(ConnectionId::new(2), tx2);
        broadcaster.register(ConnectionId::new(3), tx3);
        broadcaster.subscribe(ConnectionId::new(1), SessionId::new("a"));
        broadcaster.subscribe(ConnectionId::new(2), SessionId::new("a"));
        broadcaster.subscribe(ConnectionId::new(3), SessionId::new("b"));

        assert_eq!(broadcaster.broadcast(&store, &SessionId::new("a")), 2);

        let first = rx1.try_recv().unwrap();
        let second = rx2.try_recv().unwrap();
        assert_eq!(first, second);
        assert!(first.contains("\"sessionId\":\"a\""));
        assert!(rx3.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_unknown_session_is_noop() {
        let mut broadcaster = Broadcaster::new();
        let store = store_with(&[]);
        let (tx, mut rx) = outbound(4);
        broadcaster.register(ConnectionId::new(1), tx);
        broadcaster.subscribe(ConnectionId::new(1), SessionId::new("ghost"));

        assert_eq!(broadcaster.broadcast(&store, &SessionId::new("ghost")), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_full_queue_drops_without_affecting_others() {
        let mut broadcaster = Broadcaster::new();
        let store = store_with(&["a"]);

        let (slow_tx, mut slow_rx) = outbound(1);
        let (fast_tx, mut fast_rx) = outbound(8);
        broadcaster.register(ConnectionId::new(1), slow_tx);
        broadcaster.register(ConnectionId::new(2), fast_tx);
        broadcaster.subscribe(ConnectionId::new(1), SessionId::new("a"));
        broadcaster.subscribe(ConnectionId::new(2), SessionId::new("a"));

        assert_eq!(broadcaster.broadcast(&store, &SessionId::new("a")), 2);
        assert_eq!(broadcaster.broadcast(&store, &SessionId::new("a")), 1);

        assert!(slow_rx.try_recv().is_ok());
        assert!(slow_rx.try_recv().is_err());
        assert!(fast_rx.try_recv().is_ok());
        assert!(fast_rx.try_recv().is_ok());
    }

    #[test]
    fn test_send_to_closed_connection() {
        let mut broadcaster = Broadcaster::new();
        let (tx, rx) = outbound(1);
        broadcaster.register(ConnectionId::new(1), tx);
        drop(rx);

        assert_eq!(
            broadcaster.send_to(ConnectionId::new(1), &ServerMessage::pong()),
            Delivery::Closed
        );
        assert_eq!(
            broadcaster.send_to(ConnectionId::new(2), &ServerMessage::pong()),
            Delivery::Closed
        );
    }

    #[test]
    fn test_unregister_returns_subscription() {
        let mut broadcaster = Broadcaster::new();
        let (tx, _rx) = outbound(1);
        broadcaster.register(ConnectionId::new(1), tx);
        broadcaster.subscribe(ConnectionId::new(1), SessionId::new("a"));

        assert_eq!(broadcaster.subscriber_count(&SessionId::new("a")), 1);
        assert_eq!(broadcaster.unregister(ConnectionId::new(1)), Some(SessionId::new("a")));
        assert_eq!(broadcaster.connection_count(), 0);
        assert_eq!(broadcaster.subscriber_count(&SessionId::new("a")), 0);
    }
}
