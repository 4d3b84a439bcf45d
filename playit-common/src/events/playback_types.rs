//! Playback-related type definitions
//!
//! Supporting types for player state and queue modes.

use serde::{Deserialize, Serialize};

/// Player state as seen by observers
///
/// Exactly one variant is active at a time. `Stopped` and `Error` are
/// terminal-like: only an explicit play request leaves them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "message", rename_all = "lowercase")]
pub enum PlayerState {
    Playing,
    Paused,
    Loading,
    Stopped,
    /// Playback failed; carries a short human-readable message
    Error(String),
}

impl PlayerState {
    pub fn is_playing(&self) -> bool {
        matches!(self, PlayerState::Playing)
    }

    /// `Stopped` and `Error` need an explicit play to leave
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlayerState::Stopped | PlayerState::Error(_))
    }

    /// Error message, if this is the error state
    pub fn error_message(&self) -> Option<&str> {
        match self {
            PlayerState::Error(message) => Some(message),
            _ => None,
        }
    }
}

impl Default for PlayerState {
    fn default() -> Self {
        PlayerState::Stopped
    }
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerState::Playing => write!(f, "playing"),
            PlayerState::Paused => write!(f, "paused"),
            PlayerState::Loading => write!(f, "loading"),
            PlayerState::Stopped => write!(f, "stopped"),
            PlayerState::Error(message) => write!(f, "error: {}", message),
        }
    }
}

/// Repeat mode of the play queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    /// Stop after the last track
    #[default]
    Off,
    /// Replay the current track
    One,
    /// Wrap around to the first track
    All,
}

impl RepeatMode {
    /// Repeat-one toggle: `One` goes back to `Off`, anything else becomes `One`
    pub fn toggled_one(self) -> Self {
        match self {
            RepeatMode::One => RepeatMode::Off,
            RepeatMode::Off | RepeatMode::All => RepeatMode::One,
        }
    }
}

impl std::fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepeatMode::Off => write!(f, "off"),
            RepeatMode::One => write!(f, "one"),
            RepeatMode::All => write!(f, "all"),
        }
    }
}
