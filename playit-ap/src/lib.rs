//! # PlayIt Audio Playback (playit-ap)
//!
//! Playback session and effects coordination for the PlayIt music player.
//!
//! **Purpose:** Own a single media engine behind a long-lived session host,
//! keep the play queue (shuffle, repeat), attach the equalizer / bass boost /
//! virtualizer chain to the engine's audio session, and broadcast playback
//! snapshots to any number of clients.
//!
//! **Architecture:** engine thread (adapter + queue) <-> session host task
//! (effects chain, media session, system signals) <-> session clients

pub mod client;
pub mod effects;
pub mod engine;
pub mod error;
pub mod host;
pub mod media_session;
pub mod queue;
pub mod settings;
pub mod signals;
pub mod source;
pub mod state;

pub use client::{HandleStatus, SessionClient};
pub use error::{Error, Result};
pub use host::{HostDeps, MediaRequest, SessionCommand, SessionHandle, SessionHost, SessionService};
pub use state::SharedState;
