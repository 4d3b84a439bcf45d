//! Playback session host
//!
//! The host owns every long-lived playback resource: the engine thread, the
//! effects chain, the media session descriptor and the noisy-output receiver.
//! One task runs the coordination loop:
//!
//! ```text
//! SessionHandle ──┐
//! ControlSurface ─┼─> host loop ──> EngineHandle ──> engine thread
//! SystemSignals ──┘       ^                               │
//!                         └──── EngineNotification <──────┘
//!                         │
//!                         ├─> SharedState / EventBus ──> clients
//!                         ├─> MediaSessionDescriptor
//!                         └─> AudioEffectsChain (on audio session id)
//! ```
//!
//! [`SessionService`] starts the host on first use and tears it down once.

use crate::effects::{AudioEffectsChain, EffectsController, EffectsProvider};
use crate::engine::{EngineCommand, EngineFactory, EngineHandle, EngineNotification};
use crate::error::{Error, Result};
use crate::media_session::{ControlSurface, MediaSessionDescriptor, TransportCommand};
use crate::settings::SettingsStore;
use crate::signals::{ReceiverId, SignalError, SystemSignal, SystemSignals};
use crate::state::SharedState;
use playit_common::config::PlayerConfig;
use playit_common::events::{SessionEvent, SessionEventKind};
use playit_common::track::has_uri_scheme;
use playit_common::{PlaybackSnapshot, PlayerSettings, RepeatMode, Track, TrackLocator};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Collaborators the host is built from
pub struct HostDeps {
    /// Runs on the engine thread
    pub engine_factory: EngineFactory,
    pub effects: Arc<dyn EffectsProvider>,
    pub settings: Arc<dyn SettingsStore>,
    pub signals: SystemSignals,
}

/// Item handed to the host for queueing
///
/// `request_uri` is the locator the requester attached; when absent the host
/// falls back to the id and then to locators it resolved earlier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRequest {
    pub track: Track,
    pub request_uri: Option<String>,
}

impl MediaRequest {
    pub fn new(track: Track) -> Self {
        let request_uri = track.locator.as_ref().map(TrackLocator::uri);
        Self { track, request_uri }
    }
}

impl From<Track> for MediaRequest {
    fn from(track: Track) -> Self {
        Self::new(track)
    }
}

/// Command accepted by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Replace the queue; `play` also starts `start_index`
    SetItems {
        items: Vec<MediaRequest>,
        start_index: usize,
        play: bool,
    },
    Play(usize),
    Resume,
    Pause,
    TogglePlayPause,
    Stop,
    SeekTo(u64),
    SkipNext,
    SkipPrevious,
    ToggleShuffle,
    ToggleRepeatOne,
    SetRepeatMode(RepeatMode),
}

impl From<TransportCommand> for SessionCommand {
    fn from(command: TransportCommand) -> Self {
        match command {
            TransportCommand::Play => SessionCommand::Resume,
            TransportCommand::Pause => SessionCommand::Pause,
            TransportCommand::PlayPause => SessionCommand::TogglePlayPause,
            TransportCommand::Stop => SessionCommand::Stop,
            TransportCommand::Seek(position_ms) => SessionCommand::SeekTo(position_ms),
            TransportCommand::Next => SessionCommand::SkipNext,
            TransportCommand::Previous => SessionCommand::SkipPrevious,
        }
    }
}

enum HostMessage {
    Command(SessionCommand),
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable handle to a running host
#[derive(Clone)]
pub struct SessionHandle {
    messages: mpsc::UnboundedSender<HostMessage>,
    state: Arc<SharedState>,
    control_surface: ControlSurface,
    effects: EffectsController,
    settings: Arc<dyn SettingsStore>,
}

impl SessionHandle {
    /// Queue a command; fails once the host has stopped
    pub fn send(&self, command: SessionCommand) -> Result<()> {
        self.messages
            .send(HostMessage::Command(command))
            .map_err(|_| Error::SessionReleased)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.state.subscribe()
    }

    pub async fn snapshot(&self) -> PlaybackSnapshot {
        self.state.snapshot().await
    }

    /// Lock-free position read
    pub fn position_ms(&self) -> u64 {
        self.state.position_ms()
    }

    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    pub fn control_surface(&self) -> ControlSurface {
        self.control_surface.clone()
    }

    pub fn effects(&self) -> &EffectsController {
        &self.effects
    }

    pub fn settings(&self) -> &Arc<dyn SettingsStore> {
        &self.settings
    }

    /// Flip a track's favorite flag; the current snapshot picks it up
    pub fn toggle_favorite(&self, track_id: &str) -> Result<bool> {
        self.settings.toggle_favorite(track_id)
    }

    pub fn is_closed(&self) -> bool {
        self.messages.is_closed()
    }
}

/// A started host: its handle plus the loop task
pub struct SessionHost {
    handle: SessionHandle,
    task: JoinHandle<()>,
}

impl SessionHost {
    /// Spawn the engine thread and the host loop. Must run inside a tokio
    /// runtime.
    pub fn start(config: &PlayerConfig, deps: HostDeps) -> Result<Self> {
        let HostDeps {
            engine_factory,
            effects,
            settings,
            signals,
        } = deps;

        let (notifications, engine_events) = mpsc::unbounded_channel();
        let engine = EngineHandle::spawn(config, engine_factory, notifications)?;

        let noisy = signals.register();
        let (descriptor, transport) = MediaSessionDescriptor::new();

        let mut chain = AudioEffectsChain::new(effects);
        let stored = settings.current();
        // Applied to the processors once the engine reports its session id
        chain.apply_settings(&stored.effects);
        let chain = Arc::new(Mutex::new(chain));

        let state = Arc::new(SharedState::new(
            config.event_capacity,
            engine.position_cell(),
        ));
        let (messages, message_rx) = mpsc::unbounded_channel();

        let handle = SessionHandle {
            messages,
            state: state.clone(),
            control_surface: descriptor.control_surface(),
            effects: EffectsController::new(chain.clone(), settings.clone()),
            settings: settings.clone(),
        };

        let host_loop = HostLoop {
            engine,
            engine_events,
            messages: message_rx,
            transport,
            noisy: Some(noisy),
            signals,
            chain,
            descriptor,
            state,
            settings_rx: settings.observe(),
            known_locators: HashMap::new(),
            last_snapshot: PlaybackSnapshot::default(),
        };
        let task = tokio::spawn(host_loop.run());

        info!("Session host started");
        Ok(Self { handle, task })
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Tear down and wait for the loop to finish
    pub async fn shutdown(self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        if self.handle.messages.send(HostMessage::Shutdown(ack)).is_ok() {
            // A dropped ack means the loop already ended
            let _ = done.await;
        }
        self.task
            .await
            .map_err(|e| Error::Session(format!("host task failed: {}", e)))
    }
}

struct HostLoop {
    engine: EngineHandle,
    engine_events: mpsc::UnboundedReceiver<EngineNotification>,
    messages: mpsc::UnboundedReceiver<HostMessage>,
    transport: mpsc::UnboundedReceiver<TransportCommand>,
    noisy: Option<(ReceiverId, mpsc::UnboundedReceiver<SystemSignal>)>,
    signals: SystemSignals,
    chain: Arc<Mutex<AudioEffectsChain>>,
    descriptor: MediaSessionDescriptor,
    state: Arc<SharedState>,
    settings_rx: watch::Receiver<PlayerSettings>,
    /// Best-known locator per track id
    known_locators: HashMap<String, TrackLocator>,
    last_snapshot: PlaybackSnapshot,
}

async fn next_signal(
    noisy: &mut Option<(ReceiverId, mpsc::UnboundedReceiver<SystemSignal>)>,
) -> Option<SystemSignal> {
    match noisy {
        Some((_, rx)) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl HostLoop {
    async fn run(mut self) {
        loop {
            tokio::select! {
                message = self.messages.recv() => match message {
                    Some(HostMessage::Command(command)) => self.handle_command(command),
                    Some(HostMessage::Shutdown(ack)) => {
                        self.teardown().await;
                        let _ = ack.send(());
                        return;
                    }
                    None => {
                        debug!("All session handles dropped");
                        break;
                    }
                },
                Some(command) = self.transport.recv() => {
                    debug!("Transport command: {:?}", command);
                    self.handle_command(command.into());
                }
                Some(signal) = next_signal(&mut self.noisy) => match signal {
                    SystemSignal::AudioBecomingNoisy => {
                        info!("Audio output becoming noisy, pausing");
                        self.forward(EngineCommand::Pause);
                    }
                },
                Some(notification) = self.engine_events.recv() => {
                    self.handle_notification(notification).await;
                }
                Ok(()) = self.settings_rx.changed() => self.refresh_favorite().await,
            }
        }

        self.teardown().await;
    }

    fn handle_command(&mut self, command: SessionCommand) {
        let engine_command = match command {
            SessionCommand::SetItems {
                items,
                start_index,
                play,
            } => {
                self.set_items(items, start_index, play);
                return;
            }
            SessionCommand::TogglePlayPause => EngineCommand::TogglePlayPause,
            SessionCommand::Play(index) => EngineCommand::Play(index),
            SessionCommand::Resume => EngineCommand::Resume,
            SessionCommand::Pause => EngineCommand::Pause,
            SessionCommand::Stop => EngineCommand::Stop,
            SessionCommand::SeekTo(position_ms) => EngineCommand::SeekTo(position_ms),
            SessionCommand::SkipNext => EngineCommand::SkipNext,
            SessionCommand::SkipPrevious => EngineCommand::SkipPrevious,
            SessionCommand::ToggleShuffle => EngineCommand::ToggleShuffle,
            SessionCommand::ToggleRepeatOne => EngineCommand::ToggleRepeatOne,
            SessionCommand::SetRepeatMode(mode) => EngineCommand::SetRepeatMode(mode),
        };
        self.forward(engine_command);
    }

    fn forward(&self, command: EngineCommand) {
        if let Err(e) = self.engine.send(command) {
            warn!("Dropping command: {}", e);
        }
    }

    fn set_items(&mut self, items: Vec<MediaRequest>, start_index: usize, play: bool) {
        let start_id = items.get(start_index).map(|item| item.track.id.clone());
        let requested = items.len();

        let tracks: Vec<Track> = items
            .into_iter()
            .filter_map(|item| self.resolve(item))
            .collect();
        if tracks.len() < requested {
            warn!(
                "Queued {} of {} requested items; the rest had no locator",
                tracks.len(),
                requested
            );
        }

        // The queue keeps the first occurrence of an id; drop repeats here so
        // the start index is computed against the list the queue will hold
        let mut seen = HashSet::new();
        let tracks: Vec<Track> = tracks
            .into_iter()
            .filter(|track| seen.insert(track.id.clone()))
            .collect();

        // Dropped items shift indices; follow the requested item by id
        let start_index = start_id
            .and_then(|id| tracks.iter().position(|t| t.id == id))
            .unwrap_or(0);
        let has_tracks = !tracks.is_empty();

        self.forward(EngineCommand::SetItems {
            tracks,
            start_index,
        });
        if play && has_tracks {
            self.forward(EngineCommand::Play(start_index));
        }
    }

    /// Attach a locator to a requested item, or drop it
    fn resolve(&mut self, item: MediaRequest) -> Option<Track> {
        let MediaRequest {
            mut track,
            request_uri,
        } = item;

        let locator = request_uri
            .as_deref()
            .and_then(TrackLocator::parse)
            .or_else(|| locator_from_id(&track.id))
            .or_else(|| self.known_locators.get(&track.id).cloned());

        match locator {
            Some(locator) => {
                self.known_locators
                    .insert(track.id.clone(), locator.clone());
                track.locator = Some(locator);
                Some(track)
            }
            None => {
                warn!("No locator for track '{}', skipping", track.id);
                None
            }
        }
    }

    async fn handle_notification(&mut self, notification: EngineNotification) {
        match notification {
            EngineNotification::AudioSession(session) => {
                info!("Engine audio session {}, attaching effects", session);
                self.chain.lock().await.attach(session);
            }
            EngineNotification::Session { kind, mut snapshot } => {
                if let Some(track) = snapshot.current_track.as_mut() {
                    track.is_favorite = self.settings_rx.borrow().is_favorite(&track.id);
                }
                if let playit_common::PlayerState::Error(message) = &snapshot.state {
                    error!("Playback error: {}", message);
                }
                self.publish(kind, snapshot).await;
            }
        }
    }

    async fn publish(&mut self, kind: SessionEventKind, snapshot: PlaybackSnapshot) {
        self.descriptor.update(&snapshot);
        self.last_snapshot = snapshot.clone();
        self.state.publish(kind, snapshot).await;
    }

    /// Re-publish the current track when its favorite flag changed
    async fn refresh_favorite(&mut self) {
        let Some(track) = self.last_snapshot.current_track.as_ref() else {
            return;
        };
        let favorite = self.settings_rx.borrow().is_favorite(&track.id);
        if favorite == track.is_favorite {
            return;
        }

        let mut snapshot = self.last_snapshot.clone();
        if let Some(track) = snapshot.current_track.as_mut() {
            track.is_favorite = favorite;
        }
        snapshot.position_ms = self.state.position_ms();
        self.publish(SessionEventKind::TrackChanged, snapshot).await;
    }

    /// Release everything the host owns. Each step runs even when an
    /// earlier one fails.
    async fn teardown(&mut self) {
        info!("Tearing down session host");

        if let Some((id, _rx)) = self.noisy.take() {
            match self.signals.unregister(id) {
                Ok(()) => {}
                Err(SignalError::NotRegistered(_)) => {
                    debug!("Noisy receiver was already unregistered");
                }
            }
        }

        self.chain.lock().await.release();

        if let Err(e) = self.engine.release().await {
            warn!("Engine release failed: {}", e);
        }

        self.descriptor.release();
        info!("Session host stopped");
    }
}

/// Ids that are themselves locators: a URI or an absolute path
fn locator_from_id(id: &str) -> Option<TrackLocator> {
    if has_uri_scheme(id) || Path::new(id).is_absolute() {
        TrackLocator::parse(id)
    } else {
        None
    }
}

enum Slot {
    NotStarted(HostDeps),
    Running(SessionHost),
    Failed(String),
    Released,
}

/// Starts the host on first use and tears it down once
pub struct SessionService {
    config: PlayerConfig,
    slot: Mutex<Slot>,
}

impl SessionService {
    pub fn new(config: PlayerConfig, deps: HostDeps) -> Self {
        Self {
            config,
            slot: Mutex::new(Slot::NotStarted(deps)),
        }
    }

    /// Handle to the running host, starting it when needed
    pub async fn handle(&self) -> Result<SessionHandle> {
        let mut slot = self.slot.lock().await;

        match std::mem::replace(&mut *slot, Slot::Released) {
            Slot::NotStarted(deps) => match SessionHost::start(&self.config, deps) {
                Ok(host) => {
                    let handle = host.handle();
                    *slot = Slot::Running(host);
                    Ok(handle)
                }
                Err(e) => {
                    error!("Session host failed to start: {}", e);
                    *slot = Slot::Failed(e.to_string());
                    Err(e)
                }
            },
            Slot::Running(host) => {
                let handle = host.handle();
                *slot = Slot::Running(host);
                Ok(handle)
            }
            Slot::Failed(message) => {
                *slot = Slot::Failed(message.clone());
                Err(Error::Session(message))
            }
            Slot::Released => Err(Error::SessionReleased),
        }
    }

    pub async fn is_running(&self) -> bool {
        matches!(*self.slot.lock().await, Slot::Running(_))
    }

    /// Tear down the host. Later calls do nothing.
    pub async fn shutdown(&self) -> Result<()> {
        let mut slot = self.slot.lock().await;
        match std::mem::replace(&mut *slot, Slot::Released) {
            Slot::Running(host) => host.shutdown().await,
            Slot::NotStarted(_) | Slot::Failed(_) | Slot::Released => Ok(()),
        }
    }
}
