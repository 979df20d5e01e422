//! Registry actor - owns all session state and processes commands.
//!
//! The RegistryActor is the single owner of session state in the system.
//! Client commands arrive on an mpsc channel, tick firings on a second
//! channel, and both are applied one at a time on the actor's task.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Channel send failures are logged but don't panic

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use pomo_core::{Presets, Seconds, SessionId, TickOutcome};
use pomo_protocol::{ClientCommand, ServerMessage};

use super::commands::{RegistryCommand, RegistryError, RegistryStats};
use super::store::SessionStore;
use crate::broadcast::{Broadcaster, ConnectionId, Outbound};
use crate::timer::{spawn_ticker, TickEvent};

// ============================================================================
// Registry Actor
// ============================================================================

/// The registry actor - owns all session state.
///
/// Implements the actor pattern: receives commands via mpsc channel,
/// processes them sequentially, and fans snapshots out to subscribers.
///
/// # Ownership
///
/// The actor owns:
/// - `store`: every session's timer state and tick handle
/// - `broadcaster`: every connection's outbound queue and subscription
///
/// # Ordering
///
/// Commands and ticks interleave on one task, so no locking is needed and
/// a command that stops a timer takes effect before the next event is
/// looked at. Tick events from a cancelled run are recognised by their
/// generation and dropped.
pub struct RegistryActor {
    /// Command receiver
    receiver: mpsc::Receiver<RegistryCommand>,

    /// Sender cloned into every tick task
    tick_sender: mpsc::UnboundedSender<TickEvent>,

    /// Tick firings from all running sessions
    tick_receiver: mpsc::UnboundedReceiver<TickEvent>,

    /// Session registry
    store: SessionStore,

    /// Subscriptions and fan-out
    broadcaster: Broadcaster,

    /// Period between ticks
    tick_interval: Duration,

    /// Next tick generation to hand out
    next_generation: u64,
}

impl RegistryActor {
    /// Creates a new registry actor.
    ///
    /// # Arguments
    ///
    /// * `receiver` - Channel for receiving commands
    /// * `default_presets` - Presets given to newly created sessions
    /// * `tick_interval` - Period between ticks of a running session
    pub fn new(
        receiver: mpsc::Receiver<RegistryCommand>,
        default_presets: Presets,
        tick_interval: Duration,
    ) -> Self {
        let (tick_sender, tick_receiver) = mpsc::unbounded_channel();
        Self {
            receiver,
            tick_sender,
            tick_receiver,
            store: SessionStore::new(default_presets),
            broadcaster: Broadcaster::new(),
            tick_interval,
            next_generation: 0,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands and ticks until the command channel closes (all
    /// handles dropped). Dropping the actor cancels every tick task.
    pub async fn run(mut self) {
        info!("Registry actor starting");

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },

                // The actor holds a sender, so this channel never closes
                Some(event) = self.tick_receiver.recv() => {
                    self.handle_tick(event);
                }
            }
        }

        info!(
            sessions = self.store.len(),
            ticking = self.store.ticking_count(),
            "Registry actor stopped"
        );
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Connect {
                connection_id,
                outbound,
            } => {
                self.handle_connect(connection_id, outbound);
            }
            RegistryCommand::Disconnect { connection_id } => {
                self.handle_disconnect(connection_id);
            }
            RegistryCommand::Dispatch {
                connection_id,
                command,
                respond_to,
            } => {
                let result = self.handle_dispatch(connection_id, command);
                // Ignore send error - client may have dropped the receiver
                let _ = respond_to.send(result);
            }
            RegistryCommand::GetSession {
                session_id,
                respond_to,
            } => {
                let result = self.store.get(&session_id).map(|e| e.snapshot());
                let _ = respond_to.send(result);
            }
            RegistryCommand::GetSubscription {
                connection_id,
                respond_to,
            } => {
                let result = self.broadcaster.subscription(connection_id).cloned();
                let _ = respond_to.send(result);
            }
            RegistryCommand::Stats { respond_to } => {
                let _ = respond_to.send(self.stats());
            }
        }
    }

    // ========================================================================
    // Connection Handlers
    // ========================================================================

    fn handle_connect(&mut self, connection_id: ConnectionId, outbound: Outbound) {
        self.broadcaster.register(connection_id, outbound);
        debug!(
            connection_id = %connection_id,
            connections = self.broadcaster.connection_count(),
            "Connection attached"
        );
    }

    /// Clears the subscription. The session's timer is session-scoped and
    /// keeps running for remaining or later subscribers.
    fn handle_disconnect(&mut self, connection_id: ConnectionId) {
        let previous = self.broadcaster.unregister(connection_id);
        debug!(
            connection_id = %connection_id,
            session_id = ?previous,
            connections = self.broadcaster.connection_count(),
            "Connection detached"
        );
    }

    // ========================================================================
    // Client Command Handlers
    // ========================================================================

    fn handle_dispatch(
        &mut self,
        connection_id: ConnectionId,
        command: ClientCommand,
    ) -> Result<(), RegistryError> {
        if !self.broadcaster.is_registered(connection_id) {
            return Err(RegistryError::UnknownConnection(connection_id));
        }

        trace!(
            connection_id = %connection_id,
            command = command.type_name(),
            "Dispatching command"
        );

        match command {
            ClientCommand::JoinSession { session_id } => {
                self.handle_join(connection_id, session_id);
                Ok(())
            }
            ClientCommand::LeaveSession => {
                self.handle_leave(connection_id);
                Ok(())
            }
            ClientCommand::Ping => {
                self.broadcaster
                    .send_to(connection_id, &ServerMessage::pong());
                Ok(())
            }
            ClientCommand::StartTimer => {
                let session_id = self.subscribed_session(connection_id)?;
                self.handle_start(&session_id)
            }
            ClientCommand::PauseTimer => {
                let session_id = self.subscribed_session(connection_id)?;
                self.handle_pause(&session_id)
            }
            ClientCommand::ResetTimer => {
                let session_id = self.subscribed_session(connection_id)?;
                self.handle_reset(&session_id)
            }
            ClientCommand::SetTime { remaining_time } => {
                let session_id = self.subscribed_session(connection_id)?;
                self.handle_set_time(&session_id, remaining_time)
            }
            ClientCommand::SetPresets { presets } => {
                let session_id = self.subscribed_session(connection_id)?;
                self.handle_set_presets(&session_id, presets)
            }
        }
    }

    /// Resolves the connection's subscription to a registered session.
    fn subscribed_session(&self, connection_id: ConnectionId) -> Result<SessionId, RegistryError> {
        self.broadcaster
            .subscription(connection_id)
            .filter(|id| self.store.contains(id))
            .cloned()
            .ok_or(RegistryError::SessionNotFound)
    }

    /// Subscribes the connection, leaving any other session first, and
    /// replies with the snapshot to the requester only.
    fn handle_join(&mut self, connection_id: ConnectionId, session_id: SessionId) {
        if let Some(previous) = self.broadcaster.unsubscribe(connection_id) {
            if previous != session_id {
                info!(
                    connection_id = %connection_id,
                    session_id = %previous,
                    "Connection left session"
                );
            }
        }

        let snapshot = self.store.get_or_create(&session_id).snapshot();
        self.broadcaster.subscribe(connection_id, session_id.clone());

        info!(
            connection_id = %connection_id,
            session_id = %session_id,
            subscribers = self.broadcaster.subscriber_count(&session_id),
            "Connection joined session"
        );

        self.broadcaster
            .send_to(connection_id, &ServerMessage::timer(snapshot));
    }

    fn handle_leave(&mut self, connection_id: ConnectionId) {
        if let Some(previous) = self.broadcaster.unsubscribe(connection_id) {
            info!(
                connection_id = %connection_id,
                session_id = %previous,
                "Connection left session"
            );
        }
    }

    /// Starts ticking.
    ///
    /// The `Running` snapshot goes out before the first tick can fire.
    /// A second start is rejected by the session before any task is
    /// spawned, so a session never has two tick tasks.
    fn handle_start(&mut self, session_id: &SessionId) -> Result<(), RegistryError> {
        let generation = self.next_generation;
        let entry = self
            .store
            .get_mut(session_id)
            .ok_or(RegistryError::SessionNotFound)?;

        entry.timer_mut().start()?;
        self.next_generation = self.next_generation.wrapping_add(1);

        entry.attach_ticker(spawn_ticker(
            session_id.clone(),
            generation,
            self.tick_sender.clone(),
            self.tick_interval,
        ));

        info!(
            session_id = %session_id,
            remaining = %entry.timer().remaining(),
            generation,
            "Timer started"
        );

        self.broadcast(session_id);
        Ok(())
    }

    fn handle_pause(&mut self, session_id: &SessionId) -> Result<(), RegistryError> {
        let entry = self
            .store
            .get_mut(session_id)
            .ok_or(RegistryError::SessionNotFound)?;

        entry.timer_mut().pause();
        if entry.stop_ticking() {
            info!(
                session_id = %session_id,
                remaining = %entry.timer().remaining(),
                "Timer paused"
            );
        }

        self.broadcast(session_id);
        Ok(())
    }

    fn handle_reset(&mut self, session_id: &SessionId) -> Result<(), RegistryError> {
        let entry = self
            .store
            .get_mut(session_id)
            .ok_or(RegistryError::SessionNotFound)?;

        entry.timer_mut().reset();
        entry.stop_ticking();
        info!(
            session_id = %session_id,
            remaining = %entry.timer().remaining(),
            "Timer reset"
        );

        self.broadcast(session_id);
        Ok(())
    }

    fn handle_set_time(
        &mut self,
        session_id: &SessionId,
        value: Seconds,
    ) -> Result<(), RegistryError> {
        let entry = self
            .store
            .get_mut(session_id)
            .ok_or(RegistryError::SessionNotFound)?;

        entry.timer_mut().set_time(value);
        entry.stop_ticking();
        info!(session_id = %session_id, remaining = %value, "Timer set");

        self.broadcast(session_id);
        Ok(())
    }

    /// Replaces presets. Unlike set-time this leaves a running timer running.
    fn handle_set_presets(
        &mut self,
        session_id: &SessionId,
        presets: Presets,
    ) -> Result<(), RegistryError> {
        let entry = self
            .store
            .get_mut(session_id)
            .ok_or(RegistryError::SessionNotFound)?;

        entry.timer_mut().set_presets(presets);
        info!(session_id = %session_id, ?presets, "Presets updated");

        self.broadcast(session_id);
        Ok(())
    }

    // ========================================================================
    // Tick Handling
    // ========================================================================

    /// Applies one tick firing.
    ///
    /// Events from a cancelled run (stale generation) are dropped here;
    /// this is what keeps a pause from racing an already-queued tick.
    fn handle_tick(&mut self, event: TickEvent) {
        let Some(entry) = self.store.get_mut(&event.session_id) else {
            return;
        };

        if !entry.owns_tick(&event) {
            trace!(
                session_id = %event.session_id,
                generation = event.generation,
                "Stale tick dropped"
            );
            return;
        }

        match entry.timer_mut().tick() {
            TickOutcome::Decremented { remaining } => {
                trace!(session_id = %event.session_id, remaining = %remaining, "Tick");
            }
            TickOutcome::Expired => {
                entry.stop_ticking();
                info!(session_id = %event.session_id, "Timer finished");
            }
            TickOutcome::Ignored => {
                // Ticker outlived its run; detach without broadcasting
                entry.stop_ticking();
                return;
            }
        }

        self.broadcast(&event.session_id);
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn broadcast(&self, session_id: &SessionId) {
        self.broadcaster.broadcast(&self.store, session_id);
    }

    fn stats(&self) -> RegistryStats {
        RegistryStats {
            sessions: self.store.len(),
            connections: self.broadcaster.connection_count(),
            ticking: self.store.ticking_count(),
        }
    }
}
