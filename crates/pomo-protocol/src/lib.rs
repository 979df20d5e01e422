//! pomo-protocol - Wire protocol for pomosync
//!
//! This crate provides the message types exchanged between timer
//! clients and the daemon, and the decoder that turns inbound JSON
//! text into typed commands.

pub mod message;
pub mod parse;

pub use message::{ClientCommand, ServerMessage};
pub use parse::{decode_command, ProtocolError};
