//! Event types for the PlayIt session event system
//!
//! Provides the session event definitions and the EventBus that carries them
//! from the playback session host to every connected client.

mod playback_types;
mod shared_types;

pub use playback_types::{PlayerState, RepeatMode};
pub use shared_types::PlaybackSnapshot;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// What triggered a session event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventKind {
    /// Player state changed (play/pause/loading/stopped/error)
    StateChanged,
    /// Current item changed (skip, auto-advance, new queue)
    TrackChanged,
    /// Periodic position update or seek
    PositionChanged,
    /// Shuffle flag or repeat mode changed
    ModeChanged,
    /// Queue contents replaced
    QueueChanged,
}

/// Event broadcast by the session host
///
/// Every event carries the complete snapshot at the moment the engine raised
/// it, so a client that misses events (lagged receiver) recovers on the next
/// one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    pub snapshot: PlaybackSnapshot,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl SessionEvent {
    pub fn new(kind: SessionEventKind, snapshot: PlaybackSnapshot) -> Self {
        Self {
            kind,
            snapshot,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Position-only updates may be collapsed to the latest one by consumers
    pub fn is_position_only(&self) -> bool {
        self.kind == SessionEventKind::PositionChanged
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus for session events
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block the host)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use playit_common::events::{EventBus, PlaybackSnapshot, SessionEvent, SessionEventKind};
///
/// let event_bus = EventBus::new(64);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(SessionEvent::new(
///     SessionEventKind::StateChanged,
///     PlaybackSnapshot::default(),
/// ));
///
/// assert_eq!(rx.try_recv().unwrap().kind, SessionEventKind::StateChanged);
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered per subscriber before the
    /// oldest are dropped for that subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: SessionEvent,
    ) -> Result<usize, broadcast::error::SendError<SessionEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
