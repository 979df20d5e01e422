//! pomod - Session coordinator and broadcast server
//!
//! This crate provides the core infrastructure for the pomosync daemon:
//! - `registry` - Coordinator actor owning every session and its ticker
//! - `timer` - Per-session tick scheduling
//! - `broadcast` - Connection subscriptions and snapshot fan-out
//! - `server` - WebSocket server for client connections
//! - `config` - Daemon configuration
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        pomod daemon                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │  DaemonServer   │────▶│     RegistryActor           │   │
//! │  │  (WebSocket)    │     │  (single event queue)       │   │
//! │  └────────┬────────┘     └──────┬───────────────┬──────┘   │
//! │           │                     │               ▲          │
//! │           │ connections         │ snapshots     │ ticks    │
//! │           ▼                     ▼               │          │
//! │  ┌─────────────────┐     ┌──────────────┐ ┌─────┴──────┐   │
//! │  │ConnectionHandler│◀────│ Broadcaster  │ │  Tickers   │   │
//! │  │  (per client)   │     │ (per session)│ │(per session)│  │
//! │  └─────────────────┘     └──────────────┘ └────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod broadcast;
pub mod config;
pub mod registry;
pub mod server;
pub mod timer;
