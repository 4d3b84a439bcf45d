//! # PlayIt Common Library
//!
//! Shared code for the PlayIt playback crates:
//! - Track data model
//! - Player state, snapshots and the session event bus
//! - Persisted effects/favorites settings
//! - Configuration loading
//! - Time formatting helpers

pub mod config;
pub mod error;
pub mod events;
pub mod settings;
pub mod time;
pub mod track;

pub use error::{Error, Result};
pub use events::{PlaybackSnapshot, PlayerState, RepeatMode};
pub use settings::{EffectsSettings, PlayerSettings, SettingsField};
pub use track::{Track, TrackLocator};
