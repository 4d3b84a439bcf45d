//! Session client
//!
//! What UI code holds. Commands can be issued right away: they queue until
//! the handle to the host resolves and are then forwarded in order. The
//! listener receives every snapshot the host publishes, with bursts of
//! position updates collapsed to the latest one.

use crate::effects::EffectsController;
use crate::error::{Error, Result};
use crate::host::{MediaRequest, SessionCommand, SessionHandle, SessionService};
use crate::source::TrackSource;
use playit_common::events::SessionEvent;
use playit_common::{PlaybackSnapshot, RepeatMode, Track};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Callback receiving every published snapshot
pub type SnapshotListener = Arc<dyn Fn(PlaybackSnapshot) + Send + Sync>;

/// Connection status of a [`SessionClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleStatus {
    Idle,
    Connecting,
    Connected,
    Failed(String),
    Released,
}

impl HandleStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, HandleStatus::Connected)
    }
}

type ListenerSlot = Arc<Mutex<Option<SnapshotListener>>>;

pub struct SessionClient {
    service: Arc<SessionService>,
    status: Arc<watch::Sender<HandleStatus>>,
    handle: Arc<Mutex<Option<SessionHandle>>>,
    listener: ListenerSlot,
    commands: mpsc::UnboundedSender<SessionCommand>,
    /// Taken by the first `connect`
    pending: Mutex<Option<mpsc::UnboundedReceiver<SessionCommand>>>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    destroyed: Arc<AtomicBool>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SessionClient {
    pub fn new(service: Arc<SessionService>) -> Self {
        let (status, _) = watch::channel(HandleStatus::Idle);
        let (commands, pending) = mpsc::unbounded_channel();
        Self {
            service,
            status: Arc::new(status),
            handle: Arc::new(Mutex::new(None)),
            listener: Arc::new(Mutex::new(None)),
            commands,
            pending: Mutex::new(Some(pending)),
            tasks: Arc::new(Mutex::new(Vec::new())),
            destroyed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start resolving the session handle. Later calls share the first
    /// resolution and just return a status watcher.
    pub fn connect(&self) -> watch::Receiver<HandleStatus> {
        if self.destroyed.load(Ordering::Acquire) {
            return self.status.subscribe();
        }
        let Some(pending) = lock(&self.pending).take() else {
            return self.status.subscribe();
        };

        self.status.send_replace(HandleStatus::Connecting);

        let resolver = Resolver {
            service: self.service.clone(),
            status: self.status.clone(),
            handle: self.handle.clone(),
            listener: self.listener.clone(),
            tasks: self.tasks.clone(),
            destroyed: self.destroyed.clone(),
        };
        let task = tokio::spawn(resolver.run(pending));
        lock(&self.tasks).push(task);

        self.status.subscribe()
    }

    pub fn status(&self) -> HandleStatus {
        self.status.borrow().clone()
    }

    /// Wait until the handle resolved; errors when resolution failed or the
    /// client was destroyed first
    pub async fn wait_connected(&self) -> Result<()> {
        let mut status = self.connect();
        let outcome = status
            .wait_for(|s| !matches!(s, HandleStatus::Idle | HandleStatus::Connecting))
            .await
            .map(|s| s.clone());
        match outcome {
            Ok(HandleStatus::Connected) => Ok(()),
            Ok(HandleStatus::Failed(message)) => Err(Error::Session(message)),
            _ => Err(Error::SessionReleased),
        }
    }

    /// Register the snapshot listener, replacing any earlier one.
    ///
    /// The listener runs on the client's dispatch task while the listener
    /// slot is locked: it must not call `set_listener` or `destroy`.
    pub fn set_listener<F>(&self, listener: F)
    where
        F: Fn(PlaybackSnapshot) + Send + Sync + 'static,
    {
        if self.destroyed.load(Ordering::Acquire) {
            return;
        }
        *lock(&self.listener) = Some(Arc::new(listener));
    }

    pub fn clear_listener(&self) {
        *lock(&self.listener) = None;
    }

    /// Latest position, 0 before the handle resolved
    pub fn current_position(&self) -> u64 {
        lock(&self.handle)
            .as_ref()
            .map(SessionHandle::position_ms)
            .unwrap_or(0)
    }

    /// Latest published snapshot, if connected
    pub async fn snapshot(&self) -> Option<PlaybackSnapshot> {
        let handle = lock(&self.handle).clone()?;
        Some(handle.snapshot().await)
    }

    pub fn effects(&self) -> Option<EffectsController> {
        lock(&self.handle).as_ref().map(|h| h.effects().clone())
    }

    pub fn toggle_favorite(&self, track_id: &str) -> Result<bool> {
        let handle = lock(&self.handle)
            .clone()
            .ok_or_else(|| Error::Session("not connected".to_string()))?;
        handle.toggle_favorite(track_id)
    }

    /// Replace the queue without starting playback
    pub fn add_items(&self, tracks: Vec<Track>) {
        self.enqueue(SessionCommand::SetItems {
            items: tracks.into_iter().map(MediaRequest::new).collect(),
            start_index: 0,
            play: false,
        });
    }

    pub fn play(&self, index: usize) {
        self.enqueue(SessionCommand::Play(index));
    }

    pub fn resume(&self) {
        self.enqueue(SessionCommand::Resume);
    }

    pub fn pause(&self) {
        self.enqueue(SessionCommand::Pause);
    }

    pub fn stop(&self) {
        self.enqueue(SessionCommand::Stop);
    }

    pub fn seek_to(&self, position_ms: u64) {
        self.enqueue(SessionCommand::SeekTo(position_ms));
    }

    pub fn skip_next(&self) {
        self.enqueue(SessionCommand::SkipNext);
    }

    pub fn skip_previous(&self) {
        self.enqueue(SessionCommand::SkipPrevious);
    }

    pub fn toggle_shuffle(&self) {
        self.enqueue(SessionCommand::ToggleShuffle);
    }

    pub fn toggle_repeat_one(&self) {
        self.enqueue(SessionCommand::ToggleRepeatOne);
    }

    pub fn set_repeat_mode(&self, mode: RepeatMode) {
        self.enqueue(SessionCommand::SetRepeatMode(mode));
    }

    /// Queue the playable tracks and start the one at `start_index`.
    ///
    /// Tracks without a locator are skipped. When the requested track was
    /// one of them, playback starts at the first queued track.
    pub fn play_tracks(&self, tracks: Vec<Track>, start_index: usize) {
        let start_id = tracks.get(start_index).map(|t| t.id.clone());

        let (playable, skipped): (Vec<Track>, Vec<Track>) =
            tracks.into_iter().partition(Track::is_playable);
        for track in &skipped {
            warn!("Track '{}' has no locator, not queueing it", track.id);
        }
        if playable.is_empty() {
            debug!("play_tracks: nothing playable");
            return;
        }

        let start_index = start_id
            .and_then(|id| playable.iter().position(|t| t.id == id))
            .unwrap_or(0);
        self.enqueue(SessionCommand::SetItems {
            items: playable.into_iter().map(MediaRequest::new).collect(),
            start_index,
            play: true,
        });
    }

    /// Load the catalog from `source` and play `track_id` within it.
    ///
    /// Returns false when the track is not in the catalog or the client was
    /// destroyed.
    pub async fn play_track_from<S: TrackSource>(&self, source: &S, track_id: &str) -> Result<bool> {
        if self.destroyed.load(Ordering::Acquire) {
            return Ok(false);
        }

        let tracks = source.load_tracks().await?;
        let Some(index) = tracks.iter().position(|t| t.id == track_id) else {
            warn!("Track '{}' is not in the catalog", track_id);
            return Ok(false);
        };
        if !tracks[index].is_playable() {
            warn!("Track '{}' has no locator", track_id);
            return Ok(false);
        }

        self.play_tracks(tracks, index);
        Ok(true)
    }

    /// Stop receiving snapshots and drop the handle. Commands issued
    /// afterwards are ignored. Idempotent.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.clear_listener();
        for task in lock(&self.tasks).drain(..) {
            task.abort();
        }
        lock(&self.handle).take();
        lock(&self.pending).take();
        self.status.send_replace(HandleStatus::Released);
        debug!("Session client destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    fn enqueue(&self, command: SessionCommand) {
        if self.destroyed.load(Ordering::Acquire) {
            trace!("Ignoring {:?}: client destroyed", command);
            return;
        }
        if self.commands.send(command).is_err() {
            trace!("Command pump has stopped");
        }
    }
}

impl Drop for SessionClient {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Resolves the handle, then forwards queued commands to it
struct Resolver {
    service: Arc<SessionService>,
    status: Arc<watch::Sender<HandleStatus>>,
    handle: Arc<Mutex<Option<SessionHandle>>>,
    listener: ListenerSlot,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    destroyed: Arc<AtomicBool>,
}

impl Resolver {
    async fn run(self, mut pending: mpsc::UnboundedReceiver<SessionCommand>) {
        let handle = match self.service.handle().await {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Session handle unavailable: {}", e);
                self.status.send_replace(HandleStatus::Failed(e.to_string()));
                return;
            }
        };
        if self.destroyed.load(Ordering::Acquire) {
            return;
        }

        // Subscribe before reading the snapshot so nothing falls in between
        let events = handle.subscribe();
        let initial = handle.snapshot().await;
        *lock(&self.handle) = Some(handle.clone());

        let dispatch = tokio::spawn(dispatch_events(
            events,
            initial,
            self.listener.clone(),
            self.destroyed.clone(),
        ));
        lock(&self.tasks).push(dispatch);
        // destroy() may have drained the task list before the push
        if self.destroyed.load(Ordering::Acquire) {
            for task in lock(&self.tasks).drain(..) {
                task.abort();
            }
            return;
        }

        self.status.send_replace(HandleStatus::Connected);
        info!("Session client connected");

        while let Some(command) = pending.recv().await {
            if let Err(e) = handle.send(command) {
                warn!("Session host gone: {}", e);
                break;
            }
        }
    }
}

async fn dispatch_events(
    mut events: broadcast::Receiver<SessionEvent>,
    initial: PlaybackSnapshot,
    listener: ListenerSlot,
    destroyed: Arc<AtomicBool>,
) {
    deliver(&listener, &destroyed, initial);

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!("Session client lagged, skipped {} events", skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let snapshot = if event.is_position_only() {
            latest_position(&mut events, event)
        } else {
            event.snapshot
        };
        deliver(&listener, &destroyed, snapshot);
    }
    debug!("Session event stream closed");
}

/// Skip position updates that already have a newer one queued. Stops at the
/// first other event, which is delivered in place of the position update.
fn latest_position(
    events: &mut broadcast::Receiver<SessionEvent>,
    mut latest: SessionEvent,
) -> PlaybackSnapshot {
    loop {
        match events.try_recv() {
            Ok(next) if next.is_position_only() => latest = next,
            Ok(next) => return next.snapshot,
            Err(TryRecvError::Lagged(skipped)) => {
                warn!("Session client lagged, skipped {} events", skipped);
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return latest.snapshot,
        }
    }
}

fn deliver(listener: &ListenerSlot, destroyed: &AtomicBool, snapshot: PlaybackSnapshot) {
    let guard = lock(listener);
    if destroyed.load(Ordering::Acquire) {
        return;
    }
    if let Some(callback) = guard.as_ref() {
        callback(snapshot);
    }
}
