//! Session registry using Actor pattern.
//!
//! The registry is the central state manager for every timer session.
//! It receives commands via a tokio mpsc channel and maintains the canonical
//! source of truth for session data and connection subscriptions.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐ RegistryCommand ┌─────────────────┐  snapshot JSON  ┌──────────────────┐
//! │ ConnectionHandler│───────────────▶│  RegistryActor  │────────────────▶│ per-connection   │
//! └─────────────────┘  (mpsc channel) └─────────────────┘ (bounded mpsc)  │ outbound queues  │
//!                                        ▲                                └──────────────────┘
//!                                        │ TickEvent
//!                                  ┌─────┴─────┐
//!                                  │ tick tasks│  one per running session
//!                                  └───────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

use std::time::Duration;

use tokio::sync::mpsc;

use pomo_core::Presets;

use crate::timer::TICK_INTERVAL;

mod actor;
mod commands;
mod handle;
mod store;

pub use actor::RegistryActor;
pub use commands::{RegistryCommand, RegistryError, RegistryStats};
pub use handle::RegistryHandle;
pub use store::{SessionEntry, SessionStore};

/// Channel buffer size
const COMMAND_BUFFER: usize = 100;

/// Spawn the registry actor and return a handle for interaction.
///
/// This function:
/// 1. Creates the command channel
/// 2. Spawns the RegistryActor on a tokio task
/// 3. Returns a RegistryHandle for client use
///
/// The actor stops once every handle has been dropped.
///
/// # Example
///
/// ```no_run
/// use pomo_core::Presets;
/// use pomod::registry::spawn_registry;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = spawn_registry(Presets::default());
///
///     let stats = handle.stats().await;
///     assert_eq!(stats.sessions, 0);
/// }
/// ```
pub fn spawn_registry(default_presets: Presets) -> RegistryHandle {
    spawn_registry_with_interval(default_presets, TICK_INTERVAL)
}

/// Like [`spawn_registry`], with a custom tick period.
pub fn spawn_registry_with_interval(
    default_presets: Presets,
    tick_interval: Duration,
) -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);

    let actor = RegistryActor::new(cmd_rx, default_presets, tick_interval);
    tokio::spawn(actor.run());

    RegistryHandle::new(cmd_tx)
}
