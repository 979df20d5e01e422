//! pomo-core - Shared types for synchronized session timers
//!
//! This crate provides the core domain types shared between
//! the daemon (pomod) and its clients.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod duration;
pub mod error;
pub mod preset;
pub mod session;

// Re-exports for convenience
pub use duration::Seconds;
pub use error::{DomainError, DomainResult};
pub use preset::{PresetKind, Presets};
pub use session::{SessionId, TickOutcome, TimerSession, TimerSnapshot, TimerState};
