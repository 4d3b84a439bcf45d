//! Clock-driven media engine
//!
//! Plays nothing audible: it validates the source, "prepares" it after a
//! configurable delay and then advances a wall-clock position until the
//! track's duration is reached. Durations come from track metadata.

use super::{EngineEvent, MediaEngine};
use crate::effects::AudioSessionId;
use playit_common::{Track, TrackLocator};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Audio session ids handed out by virtual engines; 0 stays invalid
static NEXT_SESSION_ID: AtomicU32 = AtomicU32::new(1);

/// Duration assumed when the track metadata has none
const DEFAULT_DURATION_MS: u64 = 180_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Empty,
    Preparing { ready_at: Instant },
    Prepared,
    Ended,
    Failed,
}

pub struct VirtualEngine {
    session: AudioSessionId,
    session_announced: bool,
    phase: Phase,
    duration_ms: u64,
    /// Position at the last start/pause/seek
    anchor_ms: u64,
    /// Set while playing
    started_at: Option<Instant>,
    prepare_delay: Duration,
    default_duration_ms: u64,
    pending: VecDeque<EngineEvent>,
    released: bool,
}

impl VirtualEngine {
    pub fn new() -> Self {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed).max(1);
        Self {
            session: AudioSessionId(id),
            session_announced: false,
            phase: Phase::Empty,
            duration_ms: 0,
            anchor_ms: 0,
            started_at: None,
            prepare_delay: Duration::from_millis(20),
            default_duration_ms: DEFAULT_DURATION_MS,
            pending: VecDeque::new(),
            released: false,
        }
    }

    /// Simulated buffering time before an item reports ready
    pub fn with_prepare_delay(mut self, delay: Duration) -> Self {
        self.prepare_delay = delay;
        self
    }

    /// Duration used for tracks without one
    pub fn with_default_duration_ms(mut self, duration_ms: u64) -> Self {
        self.default_duration_ms = duration_ms;
        self
    }

    fn validate(locator: Option<&TrackLocator>) -> Result<(), String> {
        match locator {
            None => Err("Missing media source".to_string()),
            Some(TrackLocator::LocalFile(path)) => {
                if path.is_file() {
                    Ok(())
                } else {
                    Err(format!("File not found: {}", path.display()))
                }
            }
            Some(TrackLocator::Remote(url)) => {
                let scheme = url.split_once("://").map(|(s, _)| s.to_ascii_lowercase());
                match scheme.as_deref() {
                    Some("http") | Some("https") => Ok(()),
                    _ => Err(format!("Unsupported media source: {}", url)),
                }
            }
        }
    }

    fn current_position(&self, now: Instant) -> u64 {
        let elapsed = self
            .started_at
            .map(|t| now.saturating_duration_since(t).as_millis() as u64)
            .unwrap_or(0);
        (self.anchor_ms + elapsed).min(self.duration_ms)
    }
}

impl Default for VirtualEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaEngine for VirtualEngine {
    fn load(&mut self, track: &Track) {
        if self.released {
            return;
        }

        self.started_at = None;
        self.anchor_ms = 0;
        self.pending.clear();

        if let Err(message) = Self::validate(track.locator.as_ref()) {
            debug!("Rejecting '{}': {}", track.id, message);
            self.phase = Phase::Failed;
            self.duration_ms = 0;
            self.pending.push_back(EngineEvent::Error(message));
            return;
        }

        self.duration_ms = track.duration_ms.unwrap_or(self.default_duration_ms);
        self.phase = Phase::Preparing {
            ready_at: Instant::now() + self.prepare_delay,
        };
        self.pending.push_back(EngineEvent::Buffering);
    }

    fn start(&mut self) {
        if self.phase == Phase::Prepared && self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
    }

    fn pause(&mut self) {
        if self.started_at.is_some() {
            self.anchor_ms = self.current_position(Instant::now());
            self.started_at = None;
        }
    }

    fn seek(&mut self, position_ms: u64) {
        self.anchor_ms = position_ms.min(self.duration_ms);
        if self.phase == Phase::Ended {
            self.phase = Phase::Prepared;
        }
        if self.started_at.is_some() {
            self.started_at = Some(Instant::now());
        }
    }

    fn stop(&mut self) {
        self.phase = Phase::Empty;
        self.started_at = None;
        self.anchor_ms = 0;
        self.duration_ms = 0;
        self.pending.clear();
    }

    fn poll(&mut self) -> Vec<EngineEvent> {
        let now = Instant::now();

        match self.phase {
            Phase::Preparing { ready_at } if now >= ready_at => {
                self.phase = Phase::Prepared;
                if !self.session_announced {
                    self.session_announced = true;
                    self.pending.push_back(EngineEvent::AudioSessionId(self.session));
                }
                self.pending.push_back(EngineEvent::Ready {
                    duration_ms: self.duration_ms,
                });
            }
            Phase::Prepared if self.started_at.is_some() => {
                let position = self.current_position(now);
                trace!("Virtual position {}ms", position);
                if position >= self.duration_ms {
                    self.anchor_ms = self.duration_ms;
                    self.started_at = None;
                    self.phase = Phase::Ended;
                    self.pending.push_back(EngineEvent::Ended);
                }
            }
            _ => {}
        }

        self.pending.drain(..).collect()
    }

    fn position_ms(&self) -> u64 {
        match self.phase {
            Phase::Empty | Phase::Failed => 0,
            _ => self.current_position(Instant::now()),
        }
    }

    fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    fn audio_session_id(&self) -> AudioSessionId {
        // Reported through the event stream once the first item is ready
        if self.session_announced {
            self.session
        } else {
            AudioSessionId::INVALID
        }
    }

    fn release(&mut self) {
        self.stop();
        self.released = true;
        debug!("Virtual engine released (session {})", self.session);
    }
}
