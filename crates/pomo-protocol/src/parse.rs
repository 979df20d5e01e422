//! Decoding inbound client messages.
//!
//! Decoding is done against a `serde_json::Value` rather than a derived
//! `Deserialize` so each failure maps to a distinct error: unparseable
//! text, missing discriminator, unknown discriminator, or a bad field.

use pomo_core::{DomainError, Presets, Seconds, SessionId};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::ClientCommand;

/// Errors produced while decoding an inbound message.
///
/// All variants are reported back to the sender; none are fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Payload is not valid JSON, or not a JSON object.
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// Neither a string `type` nor a legacy `action` field is present.
    #[error("Missing message type")]
    MissingType,

    /// The discriminator names no known command.
    #[error("Unknown message type: {0}")]
    UnknownType(String),

    /// A required field is absent.
    #[error("Missing required field: {field}")]
    MissingField { field: &'static str },

    /// A field is present but fails validation.
    #[error(transparent)]
    InvalidField(#[from] DomainError),
}

impl ProtocolError {
    /// Creates a malformed-payload error from any error type.
    pub fn malformed<E: std::fmt::Display>(err: E) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// Decodes one inbound text message into a command.
///
/// The `type` field discriminates. When it is absent, the first-generation
/// `action` field is accepted (`start`, `pause`, `reset`, `set` with `time`).
///
/// `setPresets` is all-or-nothing: every preset is validated before the
/// command is built, so a single bad value rejects the whole update.
///
/// # Errors
///
/// See [`ProtocolError`] for the taxonomy.
pub fn decode_command(text: &str) -> Result<ClientCommand, ProtocolError> {
    let value: Value = serde_json::from_str(text).map_err(ProtocolError::malformed)?;
    let obj = value
        .as_object()
        .ok_or_else(|| ProtocolError::Malformed("expected a JSON object".to_string()))?;

    match obj.get("type") {
        Some(Value::String(kind)) => decode_typed(kind, obj),
        Some(_) => Err(ProtocolError::MissingType),
        None => match obj.get("action") {
            Some(Value::String(action)) => decode_legacy(action, obj),
            _ => Err(ProtocolError::MissingType),
        },
    }
}

fn decode_typed(kind: &str, obj: &Map<String, Value>) -> Result<ClientCommand, ProtocolError> {
    let command = match kind {
        "joinSession" => ClientCommand::JoinSession {
            session_id: session_id_field(obj, "sessionId")?,
        },
        "startTimer" => ClientCommand::StartTimer,
        "pauseTimer" => ClientCommand::PauseTimer,
        "resetTimer" => ClientCommand::ResetTimer,
        "setTime" => ClientCommand::SetTime {
            remaining_time: seconds_field(obj, "remainingTime")?,
        },
        "setPresets" => {
            let pomodoro = seconds_field(obj, "pomodoro")?;
            let short_break = seconds_field(obj, "shortBreak")?;
            let long_break = seconds_field(obj, "longBreak")?;
            ClientCommand::SetPresets {
                presets: Presets::new(pomodoro, short_break, long_break),
            }
        }
        "leaveSession" => ClientCommand::LeaveSession,
        "ping" => ClientCommand::Ping,
        other => return Err(ProtocolError::UnknownType(other.to_string())),
    };
    Ok(command)
}

fn decode_legacy(action: &str, obj: &Map<String, Value>) -> Result<ClientCommand, ProtocolError> {
    let command = match action {
        "start" => ClientCommand::StartTimer,
        "pause" => ClientCommand::PauseTimer,
        "reset" => ClientCommand::ResetTimer,
        "set" => ClientCommand::SetTime {
            remaining_time: seconds_field(obj, "time")?,
        },
        other => return Err(ProtocolError::UnknownType(other.to_string())),
    };
    Ok(command)
}

fn required<'a>(
    obj: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a Value, ProtocolError> {
    obj.get(field).ok_or(ProtocolError::MissingField { field })
}

fn seconds_field(obj: &Map<String, Value>, field: &'static str) -> Result<Seconds, ProtocolError> {
    let value = required(obj, field)?;
    Ok(Seconds::from_json(field, value)?)
}

fn session_id_field(
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<SessionId, ProtocolError> {
    match required(obj, field)? {
        Value::String(id) => Ok(SessionId::parse(id.as_str())?),
        other => Err(DomainError::invalid_field(field, other.to_string(), "a non-empty string").into()),
    }
}
