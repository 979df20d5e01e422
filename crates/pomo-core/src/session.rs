//! Session timer entities and value objects.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, trace};

use crate::{DomainError, DomainResult, Presets, Seconds};

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Identifier of a shared timer session.
///
/// Chosen by the first client to reference it. Opaque and case-sensitive;
/// the only constraint is that it is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Creates a new SessionId from a string.
    ///
    /// Note: This does not validate. Use [`SessionId::parse`] for
    /// client-supplied input.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates a SessionId from client input, rejecting empty strings.
    pub fn parse(id: impl Into<String>) -> DomainResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(DomainError::EmptySessionId);
        }
        Ok(Self(id))
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Timer State Machine
// ============================================================================

/// Run state of a session timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TimerState {
    /// Not ticking (initial state)
    #[default]
    Stopped,

    /// A tick process is decrementing the remaining time
    Running,
}

impl fmt::Display for TimerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Running => write!(f, "running"),
        }
    }
}

/// Result of applying one tick to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// One second was taken off; the timer keeps running.
    Decremented {
        /// Remaining time after the decrement
        remaining: Seconds,
    },

    /// The tick found no time left and stopped the timer.
    ///
    /// Emitted exactly once per run-to-zero.
    Expired,

    /// The timer was not running; nothing changed.
    Ignored,
}

/// Domain state of one shared timer session.
///
/// Pure state machine with no scheduling of its own: the daemon drives
/// `tick` once per interval while the session is running. The scheduler
/// handle lives beside this state in the daemon and is never part of it,
/// so a snapshot can never leak it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerSession {
    id: SessionId,
    state: TimerState,
    remaining: Seconds,
    initial: Seconds,
    presets: Presets,
}

impl TimerSession {
    /// Creates a stopped session whose countdown starts at the pomodoro preset.
    pub fn new(id: SessionId, presets: Presets) -> Self {
        Self {
            id,
            state: TimerState::Stopped,
            remaining: presets.pomodoro,
            initial: presets.pomodoro,
            presets,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == TimerState::Running
    }

    pub fn remaining(&self) -> Seconds {
        self.remaining
    }

    pub fn initial(&self) -> Seconds {
        self.initial
    }

    pub fn presets(&self) -> &Presets {
        &self.presets
    }

    /// Transitions to `Running`.
    ///
    /// # Errors
    ///
    /// `DomainError::AlreadyRunning` if the timer is ticking already; the
    /// state is left untouched.
    pub fn start(&mut self) -> DomainResult<()> {
        if self.is_running() {
            return Err(DomainError::AlreadyRunning {
                session_id: self.id.clone(),
            });
        }
        self.state = TimerState::Running;
        debug!(session_id = %self.id, remaining = %self.remaining, "Timer started");
        Ok(())
    }

    /// Stops the timer, keeping the remaining time. Valid from either state.
    pub fn pause(&mut self) {
        self.state = TimerState::Stopped;
        debug!(session_id = %self.id, remaining = %self.remaining, "Timer paused");
    }

    /// Stops the timer and restores the remaining time to the reset baseline.
    pub fn reset(&mut self) {
        self.state = TimerState::Stopped;
        self.remaining = self.initial;
        debug!(session_id = %self.id, remaining = %self.remaining, "Timer reset");
    }

    /// Stops the timer and makes `value` both the remaining time and the
    /// new reset baseline.
    pub fn set_time(&mut self, value: Seconds) {
        self.state = TimerState::Stopped;
        self.remaining = value;
        self.initial = value;
        debug!(session_id = %self.id, remaining = %value, "Timer set");
    }

    /// Replaces all three presets. Run state and countdown are untouched.
    pub fn set_presets(&mut self, presets: Presets) {
        self.presets = presets;
        debug!(session_id = %self.id, ?presets, "Presets updated");
    }

    /// Applies one tick.
    ///
    /// Decrement-then-check: a running timer at 1 ticks to 0 and stays
    /// running; only the following tick observes zero and stops it.
    pub fn tick(&mut self) -> TickOutcome {
        if !self.is_running() {
            return TickOutcome::Ignored;
        }

        if self.remaining.is_zero() {
            self.state = TimerState::Stopped;
            debug!(session_id = %self.id, "Timer reached zero");
            return TickOutcome::Expired;
        }

        self.remaining = self.remaining.decremented();
        trace!(session_id = %self.id, remaining = %self.remaining, "Tick");
        TickOutcome::Decremented {
            remaining: self.remaining,
        }
    }

    /// Creates the client-facing snapshot of this session.
    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            session_id: self.id.clone(),
            is_running: self.is_running(),
            remaining_time: self.remaining,
            initial_time: self.initial,
            presets: self.presets,
        }
    }
}

// ============================================================================
// Application Layer DTO
// ============================================================================

/// Read-only view of a session as delivered to clients.
///
/// Field names follow the wire format (`sessionId`, `isRunning`,
/// `remainingTime`, `initialTime`, `presets`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub session_id: SessionId,
    pub is_running: bool,
    pub remaining_time: Seconds,
    pub initial_time: Seconds,
    pub presets: Presets,
}

impl TimerSnapshot {
    /// Returns a one-line status like "abc 24:59 running".
    pub fn status_line(&self) -> String {
        let state = if self.is_running {
            TimerState::Running
        } else {
            TimerState::Stopped
        };
        format!(
            "{} {} {}",
            self.session_id,
            self.remaining_time.format_clock(),
            state
        )
    }
}

impl From<&TimerSession> for TimerSnapshot {
    fn from(session: &TimerSession) -> Self {
        session.snapshot()
    }
}
