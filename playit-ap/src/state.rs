//! Shared session state
//!
//! The latest published snapshot, the event bus and the position cell the
//! engine thread writes to. Readers on any thread get the position without
//! a lock.

use playit_common::events::{EventBus, SessionEvent, SessionEventKind};
use playit_common::{PlaybackSnapshot, PlayerState};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

pub struct SharedState {
    snapshot: RwLock<PlaybackSnapshot>,
    position_ms: Arc<AtomicU64>,
    event_bus: EventBus,
    events_published: AtomicU64,
}

impl SharedState {
    /// `position_ms` is the cell the engine thread publishes into
    pub fn new(event_capacity: usize, position_ms: Arc<AtomicU64>) -> Self {
        Self {
            snapshot: RwLock::new(PlaybackSnapshot::default()),
            position_ms,
            event_bus: EventBus::new(event_capacity),
            events_published: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Latest published snapshot
    pub async fn snapshot(&self) -> PlaybackSnapshot {
        self.snapshot.read().await.clone()
    }

    pub async fn player_state(&self) -> PlayerState {
        self.snapshot.read().await.state.clone()
    }

    /// Store the event's snapshot and broadcast it
    pub async fn publish(&self, kind: SessionEventKind, snapshot: PlaybackSnapshot) {
        *self.snapshot.write().await = snapshot.clone();
        self.events_published.fetch_add(1, Ordering::Relaxed);
        self.event_bus.emit_lossy(SessionEvent::new(kind, snapshot));
    }

    /// Position from the engine thread, no locking
    pub fn position_ms(&self) -> u64 {
        self.position_ms.load(Ordering::Relaxed)
    }

    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}
