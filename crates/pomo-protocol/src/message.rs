//! Protocol message types for client/daemon communication.
//!
//! Every message is one JSON object carried in a text frame. The `type`
//! field discriminates.

use pomo_core::{Presets, Seconds, SessionId, TimerSnapshot};
use serde::{Deserialize, Serialize};

/// Commands sent by clients to the daemon.
///
/// Serialized with the `type` tag (`{"type":"setTime","remainingTime":10}`).
/// The daemon decodes inbound text with [`crate::decode_command`], which
/// validates fields more strictly than serde would.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientCommand {
    /// Subscribe to a session, creating it on first reference
    JoinSession {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
    },

    /// Start the subscribed session's countdown
    StartTimer,

    /// Pause the subscribed session's countdown
    PauseTimer,

    /// Restore the reset baseline and stop
    ResetTimer,

    /// Set remaining time and reset baseline, stopping the timer
    SetTime {
        #[serde(rename = "remainingTime")]
        remaining_time: Seconds,
    },

    /// Replace all three presets
    SetPresets {
        #[serde(flatten)]
        presets: Presets,
    },

    /// Drop the current subscription
    LeaveSession,

    /// Keepalive, answered with `pong`
    Ping,
}

impl ClientCommand {
    /// Returns the wire discriminator for this command.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::JoinSession { .. } => "joinSession",
            Self::StartTimer => "startTimer",
            Self::PauseTimer => "pauseTimer",
            Self::ResetTimer => "resetTimer",
            Self::SetTime { .. } => "setTime",
            Self::SetPresets { .. } => "setPresets",
            Self::LeaveSession => "leaveSession",
            Self::Ping => "ping",
        }
    }

    /// Returns true if the command acts on the connection's subscribed session.
    pub fn requires_session(&self) -> bool {
        matches!(
            self,
            Self::StartTimer
                | Self::PauseTimer
                | Self::ResetTimer
                | Self::SetTime { .. }
                | Self::SetPresets { .. }
        )
    }

    /// Creates a join command.
    pub fn join(session_id: impl Into<SessionId>) -> Self {
        Self::JoinSession {
            session_id: session_id.into(),
        }
    }

    /// Creates a set-time command.
    pub fn set_time(remaining_time: Seconds) -> Self {
        Self::SetTime { remaining_time }
    }

    /// Creates a set-presets command.
    pub fn set_presets(presets: Presets) -> Self {
        Self::SetPresets { presets }
    }
}

/// Messages sent from the daemon to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Full session state, sent on join and broadcast after every change
    Timer {
        timer: TimerSnapshot,
    },

    /// Error response, sent to the originating connection only
    Error {
        message: String,
    },

    /// Keepalive response
    Pong,
}

impl ServerMessage {
    /// Creates a snapshot message.
    pub fn timer(timer: TimerSnapshot) -> Self {
        Self::Timer { timer }
    }

    /// Creates an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Creates a pong response.
    pub fn pong() -> Self {
        Self::Pong
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pomo_core::TimerSession;
    use serde_json::json;

    #[test]
    fn test_client_command_serialization() {
        let json = serde_json::to_value(ClientCommand::join("abc")).unwrap();
        assert_eq!(json, json!({"type": "joinSession", "sessionId": "abc"}));

        let json = serde_json::to_value(ClientCommand::set_time(Seconds::new(10))).unwrap();
        assert_eq!(json, json!({"type": "setTime", "remainingTime": 10}));

        let json = serde_json::to_value(ClientCommand::Ping).unwrap();
        assert_eq!(json, json!({"type": "ping"}));
    }

    #[test]
    fn test_set_presets_serialization_is_flat() {
        let json = serde_json::to_value(ClientCommand::set_presets(Presets::default())).unwrap();
        assert_eq!(
            json,
            json!({"type": "setPresets", "pomodoro": 1500, "shortBreak": 300, "longBreak": 900})
        );
    }

    #[test]
    fn test_type_name_matches_serialized_tag() {
        let commands = [
            ClientCommand::join("abc"),
            ClientCommand::StartTimer,
            ClientCommand::PauseTimer,
            ClientCommand::ResetTimer,
            ClientCommand::set_time(Seconds::new(1)),
            ClientCommand::set_presets(Presets::default()),
            ClientCommand::LeaveSession,
            ClientCommand::Ping,
        ];
        for command in commands {
            let json = serde_json::to_value(&command).unwrap();
            assert_eq!(json["type"], command.type_name());
        }
    }

    #[test]
    fn test_server_message_shapes() {
        let session = TimerSession::new(SessionId::new("abc"), Presets::default());
        let json = serde_json::to_value(ServerMessage::timer(session.snapshot())).unwrap();
        assert_eq!(json["type"], "timer");
        assert_eq!(json["timer"]["sessionId"], "abc");
        assert_eq!(json["timer"]["remainingTime"], 1500);
        assert!(json["timer"].get("tickHandle").is_none());

        let json = serde_json::to_value(ServerMessage::error("nope")).unwrap();
        assert_eq!(json, json!({"type": "error", "message": "nope"}));

        let json = serde_json::to_value(ServerMessage::pong()).unwrap();
        assert_eq!(json, json!({"type": "pong"}));
    }

    #[test]
    fn test_server_message_parses_back() {
        let parsed: ServerMessage = serde_json::from_str(r#"{"type":"pong"}"#).unwrap();
        assert_eq!(parsed, ServerMessage::Pong);
    }
}
