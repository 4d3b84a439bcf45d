//! Playback engine
//!
//! A [`MediaEngine`] plays one item at a time and reports what happened
//! through [`EngineEvent`]s. The [`EngineAdapter`] layers the queue, the
//! play-when-ready flag and the observable state machine on top of it, and
//! [`EngineHandle`] runs the adapter on its own thread.

mod adapter;
mod thread;
mod virtual_engine;

pub use adapter::{EngineAdapter, EngineState, EngineUpdate};
pub use thread::{EngineCommand, EngineHandle, EngineNotification};
pub use virtual_engine::VirtualEngine;

use crate::effects::AudioSessionId;
use playit_common::Track;

/// Something the engine reports back, drained by [`MediaEngine::poll`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Loading started or playback stalled for data
    Buffering,
    /// Item prepared; playback can start
    Ready { duration_ms: u64 },
    /// Reached the end of the item
    Ended,
    /// Loading or playback failed
    Error(String),
    /// The output stream was (re)created with a new id
    AudioSessionId(AudioSessionId),
}

/// Single-item media engine
///
/// Methods never block on I/O; outcomes arrive as events.
pub trait MediaEngine {
    /// Start preparing `track` from position 0. Replaces any loaded item.
    fn load(&mut self, track: &Track);

    /// Begin or continue playback once prepared
    fn start(&mut self);

    fn pause(&mut self);

    fn seek(&mut self, position_ms: u64);

    /// Unload the current item
    fn stop(&mut self);

    /// Drain pending events in the order they happened
    fn poll(&mut self) -> Vec<EngineEvent>;

    fn position_ms(&self) -> u64;

    /// Duration of the loaded item, 0 when unknown
    fn duration_ms(&self) -> u64;

    fn audio_session_id(&self) -> AudioSessionId;

    /// Free all resources. The engine is unusable afterwards.
    fn release(&mut self);
}

/// Builds the engine on the engine thread, so the engine itself need not be `Send`
pub type EngineFactory = Box<dyn FnOnce() -> Box<dyn MediaEngine> + Send>;
