//! Media session descriptor
//!
//! What the session advertises to control surfaces (lock screen,
//! notification, bluetooth): now-playing metadata, playback status and
//! timeline. Control surfaces send back [`TransportCommand`]s, which the host
//! handles exactly like in-app commands.

use playit_common::{PlaybackSnapshot, PlayerState};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// Button or action from a control surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", content = "position_ms", rename_all = "snake_case")]
pub enum TransportCommand {
    Play,
    Pause,
    PlayPause,
    Stop,
    Seek(u64),
    Next,
    Previous,
}

/// Playback status shown by control surfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    #[default]
    Stopped,
    Playing,
    Paused,
    Changing,
}

impl From<&PlayerState> for PlaybackStatus {
    fn from(state: &PlayerState) -> Self {
        match state {
            PlayerState::Playing => PlaybackStatus::Playing,
            PlayerState::Paused => PlaybackStatus::Paused,
            PlayerState::Loading => PlaybackStatus::Changing,
            PlayerState::Stopped | PlayerState::Error(_) => PlaybackStatus::Stopped,
        }
    }
}

/// Now-playing information
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NowPlaying {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub artwork: Option<String>,
    pub status: PlaybackStatus,
    pub position_ms: u64,
    pub duration_ms: u64,
    /// False once the session has been released
    pub active: bool,
}

impl NowPlaying {
    pub fn from_snapshot(snapshot: &PlaybackSnapshot) -> Self {
        let track = snapshot.current_track.as_ref();
        Self {
            title: track.map(|t| t.title.clone()),
            artist: track.map(|t| t.artist.clone()),
            artwork: track.and_then(|t| t.artwork.clone()),
            status: PlaybackStatus::from(&snapshot.state),
            position_ms: snapshot.position_ms,
            duration_ms: snapshot.duration_ms,
            active: true,
        }
    }
}

/// Control surface end of the media session
#[derive(Clone)]
pub struct ControlSurface {
    now_playing: watch::Receiver<NowPlaying>,
    commands: mpsc::UnboundedSender<TransportCommand>,
}

impl ControlSurface {
    pub fn now_playing(&self) -> NowPlaying {
        self.now_playing.borrow().clone()
    }

    /// Watch now-playing updates
    pub fn watch(&self) -> watch::Receiver<NowPlaying> {
        self.now_playing.clone()
    }

    /// Send a transport command; false when the session is gone
    pub fn send(&self, command: TransportCommand) -> bool {
        self.commands.send(command).is_ok()
    }
}

/// Session end of the media session
pub struct MediaSessionDescriptor {
    now_playing: watch::Sender<NowPlaying>,
    commands: mpsc::UnboundedSender<TransportCommand>,
    released: AtomicBool,
}

impl MediaSessionDescriptor {
    /// Create the descriptor and the receiver for transport commands
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TransportCommand>) {
        let (now_playing, _) = watch::channel(NowPlaying::default());
        let (commands, command_rx) = mpsc::unbounded_channel();
        (
            Self {
                now_playing,
                commands,
                released: AtomicBool::new(false),
            },
            command_rx,
        )
    }

    pub fn control_surface(&self) -> ControlSurface {
        ControlSurface {
            now_playing: self.now_playing.subscribe(),
            commands: self.commands.clone(),
        }
    }

    /// Publish the snapshot's metadata, status and timeline
    pub fn update(&self, snapshot: &PlaybackSnapshot) {
        if self.released.load(Ordering::Acquire) {
            return;
        }
        let now_playing = NowPlaying::from_snapshot(snapshot);
        self.now_playing.send_if_modified(|current| {
            if *current == now_playing {
                false
            } else {
                *current = now_playing;
                true
            }
        });
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Clear now-playing and mark the session inactive. Idempotent.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.now_playing.send_replace(NowPlaying::default());
        debug!("Media session released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use playit_common::Track;

    fn snapshot(state: PlayerState) -> PlaybackSnapshot {
        PlaybackSnapshot {
            state,
            current_track: Some(Track::new("1", "Song", "Band").with_artwork("https://img/1.png")),
            current_index: Some(0),
            queue_len: 1,
            position_ms: 1_000,
            duration_ms: 200_000,
            ..Default::default()
        }
    }

    #[test]
    fn test_update_publishes_now_playing() {
        let (descriptor, _rx) = MediaSessionDescriptor::new();
        let surface = descriptor.control_surface();

        descriptor.update(&snapshot(PlayerState::Playing));
        let now = surface.now_playing();
        assert_eq!(now.title.as_deref(), Some("Song"));
        assert_eq!(now.artwork.as_deref(), Some("https://img/1.png"));
        assert_eq!(now.status, PlaybackStatus::Playing);
        assert_eq!(now.duration_ms, 200_000);
        assert!(now.active);
    }

    #[test]
    fn test_error_state_shows_stopped() {
        assert_eq!(
            PlaybackStatus::from(&PlayerState::Error("boom".into())),
            PlaybackStatus::Stopped
        );
        assert_eq!(PlaybackStatus::from(&PlayerState::Loading), PlaybackStatus::Changing);
    }

    #[tokio::test]
    async fn test_transport_commands_reach_session() {
        let (descriptor, mut rx) = MediaSessionDescriptor::new();
        let surface = descriptor.control_surface();

        assert!(surface.send(TransportCommand::Seek(5_000)));
        assert!(surface.send(TransportCommand::Next));
        assert_eq!(rx.recv().await, Some(TransportCommand::Seek(5_000)));
        assert_eq!(rx.recv().await, Some(TransportCommand::Next));
    }

    #[test]
    fn test_release_clears_and_ignores_later_updates() {
        let (descriptor, _rx) = MediaSessionDescriptor::new();
        let surface = descriptor.control_surface();
        descriptor.update(&snapshot(PlayerState::Playing));

        descriptor.release();
        descriptor.release();
        descriptor.update(&snapshot(PlayerState::Paused));

        assert!(descriptor.is_released());
        assert_eq!(surface.now_playing(), NowPlaying::default());
        assert!(!surface.now_playing().active);
    }
}
