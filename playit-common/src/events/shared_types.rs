//! Shared type definitions for event data

use serde::{Deserialize, Serialize};

use super::playback_types::{PlayerState, RepeatMode};
use crate::track::Track;

/// Observable playback state delivered to session clients
///
/// One snapshot is built per engine notification; observers never need to
/// merge partial updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PlaybackSnapshot {
    pub state: PlayerState,
    /// Track at the current queue index (None when the queue is empty)
    pub current_track: Option<Track>,
    /// Index of `current_track` within the queue
    pub current_index: Option<usize>,
    /// Number of items in the queue
    pub queue_len: usize,
    /// Playback position in milliseconds (never negative)
    pub position_ms: u64,
    /// Duration of the current item in milliseconds (0 when unknown)
    pub duration_ms: u64,
    pub shuffle_enabled: bool,
    pub repeat_mode: RepeatMode,
}

impl PlaybackSnapshot {
    pub fn repeat_one_enabled(&self) -> bool {
        self.repeat_mode == RepeatMode::One
    }

    /// Fraction of the current item played, 0.0 when the duration is unknown
    pub fn progress(&self) -> f32 {
        if self.duration_ms > 0 {
            (self.position_ms as f64 / self.duration_ms as f64).min(1.0) as f32
        } else {
            0.0
        }
    }
}
