//! Engine adapter
//!
//! Owns the [`MediaEngine`] and the [`TrackQueue`] and drives the playback
//! state machine:
//!
//! ```text
//! Idle -> Buffering -> Ready -> (Playing <-> Paused) -> Ended
//!                 any state -> Error
//! ```
//!
//! Every command and every engine event may queue [`EngineUpdate`]s, which
//! the owner drains with [`EngineAdapter::take_updates`].

use super::{EngineEvent, MediaEngine};
use crate::effects::AudioSessionId;
use crate::queue::TrackQueue;
use playit_common::events::SessionEventKind;
use playit_common::{PlaybackSnapshot, PlayerState, RepeatMode, Track};
use tracing::{debug, error, info};

/// Adapter-level playback state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
    /// Nothing loaded
    Idle,
    /// Preparing the current item
    Buffering,
    /// Prepared, waiting for play-when-ready
    Ready,
    Playing,
    Paused,
    /// Finished the last item with nothing to advance to
    Ended,
    Error(String),
}

/// Change the owner should publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineUpdate {
    Session(SessionEventKind),
    AudioSession(AudioSessionId),
}

pub struct EngineAdapter {
    engine: Box<dyn MediaEngine>,
    queue: TrackQueue,
    state: EngineState,
    play_when_ready: bool,
    audio_session: AudioSessionId,
    updates: Vec<EngineUpdate>,
}

impl EngineAdapter {
    pub fn new(engine: Box<dyn MediaEngine>, queue: TrackQueue) -> Self {
        let mut adapter = Self {
            engine,
            queue,
            state: EngineState::Idle,
            play_when_ready: false,
            audio_session: AudioSessionId::INVALID,
            updates: Vec::new(),
        };

        // Engines that own their output stream up front report it right away
        let session = adapter.engine.audio_session_id();
        adapter.note_audio_session(session);
        adapter
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn play_when_ready(&self) -> bool {
        self.play_when_ready
    }

    pub fn queue(&self) -> &TrackQueue {
        &self.queue
    }

    pub fn audio_session(&self) -> AudioSessionId {
        self.audio_session
    }

    /// Drain updates queued since the last call
    pub fn take_updates(&mut self) -> Vec<EngineUpdate> {
        std::mem::take(&mut self.updates)
    }

    /// Replace the queue. The engine is stopped and the adapter goes idle.
    pub fn set_items(&mut self, tracks: Vec<Track>, start_index: usize) {
        self.engine.stop();
        self.play_when_ready = false;
        self.queue.set_queue(tracks, start_index);
        self.set_state(EngineState::Idle);
        self.push(SessionEventKind::QueueChanged);
        self.push(SessionEventKind::TrackChanged);
    }

    /// Play the item at `index` from its start.
    ///
    /// Does nothing when already playing `index` or when `index` is invalid.
    pub fn play(&mut self, index: usize) {
        if self.queue.current_index() == Some(index) && self.state == EngineState::Playing {
            debug!("play({}) ignored: already playing", index);
            return;
        }
        if !self.queue.set_current(index) {
            debug!("play({}) ignored: queue has {} items", index, self.queue.len());
            return;
        }

        self.play_when_ready = true;
        self.prepare_current();
        self.pump();
    }

    /// Continue playback, re-preparing the current item when nothing is loaded
    pub fn resume(&mut self) {
        self.play_when_ready = true;

        match self.state {
            EngineState::Idle | EngineState::Error(_) | EngineState::Ended => {
                if self.queue.current_index().is_some() {
                    self.prepare_current();
                } else {
                    debug!("resume ignored: queue is empty");
                }
            }
            EngineState::Ready | EngineState::Paused => {
                self.engine.start();
                self.set_state(EngineState::Playing);
            }
            // Starts when the engine reports ready
            EngineState::Buffering => {}
            EngineState::Playing => {}
        }
        self.pump();
    }

    /// Clear play-when-ready and pause. An item still buffering is held
    /// once it becomes ready.
    pub fn pause(&mut self) {
        self.play_when_ready = false;

        if self.state == EngineState::Playing {
            self.engine.pause();
            self.set_state(EngineState::Paused);
        }
    }

    /// Pause when playback is wanted and an item is loaded, otherwise resume
    pub fn toggle_play_pause(&mut self) {
        let loaded = !matches!(
            self.state,
            EngineState::Idle | EngineState::Ended | EngineState::Error(_)
        );
        if self.play_when_ready && loaded {
            self.pause();
        } else {
            self.resume();
        }
    }

    /// Unload the current item. The queue position is kept, so a later
    /// resume starts it again from the beginning.
    pub fn stop(&mut self) {
        self.engine.stop();
        self.play_when_ready = false;
        self.set_state(EngineState::Idle);
    }

    /// Seek within the loaded item, clamped to its duration
    pub fn seek_to(&mut self, position_ms: u64) {
        if self.queue.current_track().is_none() {
            return;
        }
        if matches!(self.state, EngineState::Idle | EngineState::Error(_)) {
            debug!("seek_to({}) ignored: nothing loaded", position_ms);
            return;
        }

        let duration = self.engine.duration_ms();
        let target = if duration > 0 {
            position_ms.min(duration)
        } else {
            position_ms
        };
        self.engine.seek(target);

        if self.state == EngineState::Ended {
            // Seeking back into a finished item leaves it prepared but held
            self.play_when_ready = false;
            self.set_state(EngineState::Ready);
        }
        self.push(SessionEventKind::PositionChanged);
        self.pump();
    }

    pub fn skip_to_next(&mut self) {
        match self.queue.next() {
            Some(index) => {
                debug!("Skipping to next item {}", index);
                self.play_when_ready = true;
                self.prepare_current();
                self.pump();
            }
            None => debug!("skip_to_next ignored: no next item"),
        }
    }

    pub fn skip_to_previous(&mut self) {
        match self.queue.previous() {
            Some(index) => {
                debug!("Skipping to previous item {}", index);
                self.play_when_ready = true;
                self.prepare_current();
                self.pump();
            }
            None => debug!("skip_to_previous ignored: no previous item"),
        }
    }

    pub fn toggle_shuffle(&mut self) {
        let enabled = self.queue.toggle_shuffle();
        debug!("Shuffle {}", if enabled { "on" } else { "off" });
        self.push(SessionEventKind::ModeChanged);
    }

    pub fn toggle_repeat_one(&mut self) {
        let mode = self.queue.toggle_repeat_one();
        debug!("Repeat mode {:?}", mode);
        self.push(SessionEventKind::ModeChanged);
    }

    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        if self.queue.repeat_mode() != mode {
            self.queue.set_repeat_mode(mode);
            self.push(SessionEventKind::ModeChanged);
        }
    }

    /// Process engine events; call periodically
    pub fn tick(&mut self) {
        self.pump();
    }

    /// Playback position, 0 when nothing is loaded
    pub fn position_ms(&self) -> u64 {
        match self.state {
            EngineState::Idle | EngineState::Error(_) => 0,
            _ => self.engine.position_ms(),
        }
    }

    /// State as observers see it
    pub fn player_state(&self) -> PlayerState {
        match &self.state {
            EngineState::Idle | EngineState::Ended => PlayerState::Stopped,
            EngineState::Buffering => PlayerState::Loading,
            EngineState::Ready | EngineState::Paused => {
                if self.play_when_ready {
                    PlayerState::Playing
                } else {
                    PlayerState::Paused
                }
            }
            EngineState::Playing => PlayerState::Playing,
            EngineState::Error(message) => PlayerState::Error(message.clone()),
        }
    }

    /// Full observable status
    pub fn status(&self) -> PlaybackSnapshot {
        let current_track = self.queue.current_track().cloned();
        let duration_ms = match self.engine.duration_ms() {
            0 => current_track
                .as_ref()
                .and_then(|t| t.duration_ms)
                .unwrap_or(0),
            known => known,
        };

        PlaybackSnapshot {
            state: self.player_state(),
            current_track,
            current_index: self.queue.current_index(),
            queue_len: self.queue.len(),
            position_ms: self.position_ms(),
            duration_ms,
            shuffle_enabled: self.queue.shuffle_enabled(),
            repeat_mode: self.queue.repeat_mode(),
        }
    }

    /// Stop and free the engine
    pub fn release(&mut self) {
        self.engine.stop();
        self.engine.release();
        self.play_when_ready = false;
        self.state = EngineState::Idle;
        info!("Engine released");
    }

    fn prepare_current(&mut self) {
        let Some(track) = self.queue.current_track().cloned() else {
            return;
        };

        debug!("Preparing '{}' ({})", track.title, track.id);
        self.engine.load(&track);
        self.push(SessionEventKind::TrackChanged);
        self.set_state(EngineState::Buffering);
    }

    fn pump(&mut self) {
        // Handling an event can load a new item, which queues more events
        loop {
            let events = self.engine.poll();
            if events.is_empty() {
                break;
            }
            for event in events {
                self.handle_event(event);
            }
        }
    }

    fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Buffering => {
                if !matches!(self.state, EngineState::Error(_)) {
                    self.set_state(EngineState::Buffering);
                }
            }
            EngineEvent::Ready { duration_ms } => {
                debug!("Item ready ({}ms)", duration_ms);
                if self.play_when_ready {
                    self.engine.start();
                    self.set_state(EngineState::Playing);
                } else {
                    self.set_state(EngineState::Ready);
                }
            }
            EngineEvent::Ended => self.on_item_ended(),
            EngineEvent::Error(message) => {
                error!("Playback error: {}", message);
                self.play_when_ready = false;
                self.set_state(EngineState::Error(message));
            }
            EngineEvent::AudioSessionId(session) => self.note_audio_session(session),
        }
    }

    fn on_item_ended(&mut self) {
        match self.queue.next() {
            Some(index) => {
                debug!("Item ended, advancing to {}", index);
                self.prepare_current();
            }
            None => {
                info!("Reached end of queue");
                self.set_state(EngineState::Ended);
            }
        }
    }

    fn note_audio_session(&mut self, session: AudioSessionId) {
        if session.is_valid() && session != self.audio_session {
            debug!("Audio session id changed to {}", session);
            self.audio_session = session;
            self.updates.push(EngineUpdate::AudioSession(session));
        }
    }

    fn set_state(&mut self, state: EngineState) {
        if self.state != state {
            debug!("Engine state {:?} -> {:?}", self.state, state);
            self.state = state;
            self.push(SessionEventKind::StateChanged);
        }
    }

    fn push(&mut self, kind: SessionEventKind) {
        self.updates.push(EngineUpdate::Session(kind));
    }
}
