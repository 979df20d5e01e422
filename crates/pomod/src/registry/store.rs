//! In-memory session registry.
//!
//! Maps session ids to their timer state and live tick handle. Sessions
//! are created on first reference and never removed for the lifetime of
//! the process.

use std::collections::HashMap;

use tracing::info;

use pomo_core::{Presets, SessionId, TimerSession, TimerSnapshot};

use crate::timer::{TickEvent, TickHandle};

/// Timer state plus the handle of its tick task.
///
/// The handle is present exactly while the timer is running. It is kept
/// beside the domain state rather than inside it, so snapshots never see it.
#[derive(Debug)]
pub struct SessionEntry {
    timer: TimerSession,
    ticker: Option<TickHandle>,
}

impl SessionEntry {
    fn new(timer: TimerSession) -> Self {
        Self {
            timer,
            ticker: None,
        }
    }

    pub fn timer(&self) -> &TimerSession {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut TimerSession {
        &mut self.timer
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        self.timer.snapshot()
    }

    /// Returns true if a tick task is attached.
    pub fn is_ticking(&self) -> bool {
        self.ticker.is_some()
    }

    /// Returns true if `event` was emitted by the attached tick task.
    pub fn owns_tick(&self, event: &TickEvent) -> bool {
        self.ticker
            .as_ref()
            .is_some_and(|ticker| ticker.owns(event))
    }

    /// Attaches a tick task, cancelling any previous one.
    pub fn attach_ticker(&mut self, ticker: TickHandle) {
        if let Some(previous) = self.ticker.replace(ticker) {
            previous.cancel();
        }
    }

    /// Cancels and clears the tick task. Returns true if one was attached.
    pub fn stop_ticking(&mut self) -> bool {
        match self.ticker.take() {
            Some(ticker) => {
                ticker.cancel();
                true
            }
            None => false,
        }
    }
}

/// The session registry.
#[derive(Debug)]
pub struct SessionStore {
    sessions: HashMap<SessionId, SessionEntry>,
    default_presets: Presets,
}

impl SessionStore {
    /// Creates an empty registry. New sessions start from `default_presets`.
    pub fn new(default_presets: Presets) -> Self {
        Self {
            sessions: HashMap::new(),
            default_presets,
        }
    }

    /// Returns the session, creating it with defaults if absent.
    pub fn get_or_create(&mut self, session_id: &SessionId) -> &mut SessionEntry {
        let default_presets = self.default_presets;
        let total = self.sessions.len();
        self.sessions.entry(session_id.clone()).or_insert_with(|| {
            info!(
                session_id = %session_id,
                remaining = %default_presets.pomodoro,
                total_sessions = total + 1,
                "Session created"
            );
            SessionEntry::new(TimerSession::new(session_id.clone(), default_presets))
        })
    }

    pub fn get(&self, session_id: &SessionId) -> Option<&SessionEntry> {
        self.sessions.get(session_id)
    }

    pub fn get_mut(&mut self, session_id: &SessionId) -> Option<&mut SessionEntry> {
        self.sessions.get_mut(session_id)
    }

    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Number of sessions with an attached tick task.
    pub fn ticking_count(&self) -> usize {
        self.sessions.values().filter(|e| e.is_ticking()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pomo_core::Seconds;

    #[test]
    fn test_get_or_create_is_idempotent() {
        let mut store = SessionStore::new(Presets::default());
        let id = SessionId::new("abc");

        store.get_or_create(&id).timer_mut().set_time(Seconds::new(10));
        let entry = store.get_or_create(&id);
        assert_eq!(entry.timer().remaining(), Seconds::new(10));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_absent_is_none() {
        let store = SessionStore::new(Presets::default());
        assert!(store.get(&SessionId::new("abc")).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_new_sessions_use_default_presets() {
        let presets = Presets::new(Seconds::new(60), Seconds::new(10), Seconds::new(30));
        let mut store = SessionStore::new(presets);
        let entry = store.get_or_create(&SessionId::new("abc"));

        assert_eq!(entry.timer().presets(), &presets);
        assert_eq!(entry.timer().remaining(), Seconds::new(60));
        assert_eq!(entry.timer().initial(), Seconds::new(60));
        assert!(!entry.timer().is_running());
        assert!(!entry.is_ticking());
    }

    #[test]
    fn test_stop_ticking_without_ticker() {
        let mut store = SessionStore::new(Presets::default());
        let entry = store.get_or_create(&SessionId::new("abc"));
        assert!(!entry.stop_ticking());
        assert_eq!(store.ticking_count(), 0);
    }
}
