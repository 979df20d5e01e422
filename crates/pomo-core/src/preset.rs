//! Named preset durations.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Seconds;

/// One of the three named presets a session carries.
///
/// Presets only seed client shortcuts; they never change the live
/// countdown on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PresetKind {
    /// Focus interval
    Pomodoro,

    /// Short rest between focus intervals
    ShortBreak,

    /// Long rest after several focus intervals
    LongBreak,
}

impl PresetKind {
    /// All preset kinds in display order.
    pub const ALL: [PresetKind; 3] = [Self::Pomodoro, Self::ShortBreak, Self::LongBreak];

    /// Returns the wire field name for this preset.
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::Pomodoro => "pomodoro",
            Self::ShortBreak => "shortBreak",
            Self::LongBreak => "longBreak",
        }
    }

    /// Returns a descriptive label for the preset.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pomodoro => "Pomodoro",
            Self::ShortBreak => "Short Break",
            Self::LongBreak => "Long Break",
        }
    }

    /// Parses a preset name, accepting wire names and common spellings.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "pomodoro" | "focus" => Some(Self::Pomodoro),
            "shortbreak" | "short" => Some(Self::ShortBreak),
            "longbreak" | "long" => Some(Self::LongBreak),
            _ => None,
        }
    }
}

impl fmt::Display for PresetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// The three preset durations of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presets {
    pub pomodoro: Seconds,
    pub short_break: Seconds,
    pub long_break: Seconds,
}

impl Presets {
    /// Default focus interval (25 minutes).
    pub const DEFAULT_POMODORO: Seconds = Seconds::from_minutes(25);

    /// Default short break (5 minutes).
    pub const DEFAULT_SHORT_BREAK: Seconds = Seconds::from_minutes(5);

    /// Default long break (15 minutes).
    pub const DEFAULT_LONG_BREAK: Seconds = Seconds::from_minutes(15);

    pub const fn new(pomodoro: Seconds, short_break: Seconds, long_break: Seconds) -> Self {
        Self {
            pomodoro,
            short_break,
            long_break,
        }
    }

    /// Returns the duration for a preset kind.
    pub fn get(&self, kind: PresetKind) -> Seconds {
        match kind {
            PresetKind::Pomodoro => self.pomodoro,
            PresetKind::ShortBreak => self.short_break,
            PresetKind::LongBreak => self.long_break,
        }
    }

    /// Returns the preset whose duration equals `secs`, if any.
    ///
    /// Clients use this to highlight the shortcut matching the current
    /// reset baseline. Ties resolve in `PresetKind::ALL` order.
    pub fn matching(&self, secs: Seconds) -> Option<PresetKind> {
        PresetKind::ALL.into_iter().find(|kind| self.get(*kind) == secs)
    }
}

impl Default for Presets {
    fn default() -> Self {
        Self::new(
            Self::DEFAULT_POMODORO,
            Self::DEFAULT_SHORT_BREAK,
            Self::DEFAULT_LONG_BREAK,
        )
    }
}
