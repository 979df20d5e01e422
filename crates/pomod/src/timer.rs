//! Per-session tick scheduling.
//!
//! A running session owns exactly one [`TickHandle`]. The handle's task
//! wakes once per period and posts a [`TickEvent`] to the registry actor;
//! it never touches session state itself. Decrements are applied by the
//! actor, on the same queue as client commands.
//!
//! Cancellation has two layers:
//! - the task's `CancellationToken` stops further firings
//! - every event carries the run's `generation`, and the actor discards
//!   events whose generation no longer matches the session's live handle
//!
//! The second layer is what makes cancellation synchronous: a firing that
//! was already queued when the handle was dropped is ignored, so no
//! decrement can land after a pause, reset or set-time returns.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use pomo_core::SessionId;

/// Fixed period between ticks.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// A tick firing, addressed to one run of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickEvent {
    pub session_id: SessionId,
    pub generation: u64,
}

/// Handle to a session's repeating tick task.
///
/// Dropping the handle cancels the task.
#[derive(Debug)]
pub struct TickHandle {
    generation: u64,
    cancel: CancellationToken,
}

impl TickHandle {
    /// Generation stamped on every event this handle's task emits.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns true if an event belongs to this run.
    pub fn owns(&self, event: &TickEvent) -> bool {
        event.generation == self.generation
    }

    /// Stops the task.
    pub fn cancel(self) {
        // Drop does the work
    }
}

impl Drop for TickHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Spawns the repeating tick task for one run of a session.
///
/// The first event fires one `period` after the call; there is no
/// immediate tick. The task exits when the handle is dropped or the
/// event channel closes.
pub fn spawn_ticker(
    session_id: SessionId,
    generation: u64,
    events: mpsc::UnboundedSender<TickEvent>,
    period: Duration,
) -> TickHandle {
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    trace!(session_id = %session_id, generation, "Ticker cancelled");
                    break;
                }

                _ = ticker.tick() => {
                    let event = TickEvent {
                        session_id: session_id.clone(),
                        generation,
                    };
                    if events.send(event).is_err() {
                        // Actor stopped - exit ticker
                        debug!(session_id = %session_id, "Ticker stopping: registry channel closed");
                        break;
                    }
                }
            }
        }
    });

    TickHandle { generation, cancel }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_ticker_fires_once_per_period() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _handle = spawn_ticker(SessionId::new("abc"), 7, tx, TICK_INTERVAL);

        // Nothing before the first period elapses
        tokio::time::sleep(Duration::from_millis(999)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(2)).await;
        let event = rx.try_recv().unwrap();
        assert_eq!(event.session_id, SessionId::new("abc"));
        assert_eq!(event.generation, 7);

        tokio::time::sleep(TICK_INTERVAL).await;
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_ticker() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = spawn_ticker(SessionId::new("abc"), 1, tx, TICK_INTERVAL);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(rx.try_recv().is_ok());

        handle.cancel();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_exits_when_channel_closes() {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = spawn_ticker(SessionId::new("abc"), 1, tx, TICK_INTERVAL);
        drop(rx);

        // Should not panic; task notices the closed channel on its next firing
        tokio::time::sleep(Duration::from_secs(2)).await;
        drop(handle);
    }

    #[test]
    fn test_handle_owns_matching_generation() {
        let handle = TickHandle {
            generation: 3,
            cancel: CancellationToken::new(),
        };
        let event = TickEvent {
            session_id: SessionId::new("abc"),
            generation: 3,
        };
        assert!(handle.owns(&event));
        assert!(!handle.owns(&TickEvent {
            generation: 2,
            ..event
        }));
        assert_eq!(handle.generation(), 3);
    }
}
