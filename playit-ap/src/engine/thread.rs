//! Engine thread
//!
//! The engine and its adapter live on one dedicated OS thread running a
//! current-thread tokio runtime. Everything else talks to them through
//! [`EngineHandle`]: commands go in over an mpsc channel, notifications come
//! out over another, and the playback position is published through an
//! atomic for lock-free polling.

use super::{EngineAdapter, EngineFactory, EngineUpdate};
use crate::effects::AudioSessionId;
use crate::error::{Error, Result};
use crate::queue::TrackQueue;
use playit_common::config::PlayerConfig;
use playit_common::events::SessionEventKind;
use playit_common::{PlaybackSnapshot, RepeatMode, Track};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, trace};

/// Command marshaled onto the engine thread
#[derive(Debug)]
pub enum EngineCommand {
    SetItems { tracks: Vec<Track>, start_index: usize },
    Play(usize),
    Resume,
    Pause,
    /// Decided against the engine's own state, after earlier commands
    TogglePlayPause,
    Stop,
    SeekTo(u64),
    SkipNext,
    SkipPrevious,
    ToggleShuffle,
    ToggleRepeatOne,
    SetRepeatMode(RepeatMode),
    /// Reply with the current status
    Status(oneshot::Sender<PlaybackSnapshot>),
    Shutdown,
}

/// Notification raised on the engine thread, in engine order
#[derive(Debug, Clone)]
pub enum EngineNotification {
    Session {
        kind: SessionEventKind,
        snapshot: PlaybackSnapshot,
    },
    AudioSession(AudioSessionId),
}

/// Owner-side handle to the engine thread
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<EngineCommand>,
    position_ms: Arc<AtomicU64>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl EngineHandle {
    /// Start the engine thread. `factory` runs on the new thread.
    pub fn spawn(
        config: &PlayerConfig,
        factory: EngineFactory,
        notifications: mpsc::UnboundedSender<EngineNotification>,
    ) -> Result<Self> {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let position_ms = Arc::new(AtomicU64::new(0));

        // interval() panics on a zero period
        let tick = Duration::from_millis(config.engine_tick_ms.max(1));
        let position_interval = Duration::from_millis(config.position_interval_ms as u64);
        let thread_position = position_ms.clone();

        let thread = std::thread::Builder::new()
            .name(config.engine_thread_name.clone())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!("Failed to build engine runtime: {}", e);
                        return;
                    }
                };

                let adapter = EngineAdapter::new(factory(), TrackQueue::new());
                let engine_loop = EngineLoop {
                    adapter,
                    commands: command_rx,
                    notifications,
                    position_ms: thread_position,
                    position_interval,
                };
                runtime.block_on(engine_loop.run(tick));
            })
            .map_err(|e| Error::Engine(format!("Failed to spawn engine thread: {}", e)))?;

        info!("Engine thread '{}' started", config.engine_thread_name);

        Ok(Self {
            commands,
            position_ms,
            thread: Some(thread),
        })
    }

    /// Queue a command for the engine thread
    pub fn send(&self, command: EngineCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::Engine("engine thread has stopped".to_string()))
    }

    /// Current status, fetched from the engine thread
    pub async fn status(&self) -> Result<PlaybackSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(EngineCommand::Status(tx))?;
        rx.await
            .map_err(|_| Error::Engine("engine thread dropped status request".to_string()))
    }

    /// Last position published by the engine thread
    pub fn position_ms(&self) -> u64 {
        self.position_ms.load(Ordering::Relaxed)
    }

    /// Shared position cell, for readers that outlive this handle's borrow
    pub fn position_cell(&self) -> Arc<AtomicU64> {
        self.position_ms.clone()
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    /// Stop the engine, release it and wait for the thread to exit
    pub async fn release(&mut self) -> Result<()> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };

        // The thread may already be gone; joining still reaps it
        let _ = self.commands.send(EngineCommand::Shutdown);

        tokio::task::spawn_blocking(move || thread.join())
            .await
            .map_err(|e| Error::Engine(format!("engine join task failed: {}", e)))?
            .map_err(|_| Error::Engine("engine thread panicked".to_string()))?;

        info!("Engine thread stopped");
        Ok(())
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            let _ = self.commands.send(EngineCommand::Shutdown);
        }
    }
}

struct EngineLoop {
    adapter: EngineAdapter,
    commands: mpsc::UnboundedReceiver<EngineCommand>,
    notifications: mpsc::UnboundedSender<EngineNotification>,
    position_ms: Arc<AtomicU64>,
    position_interval: Duration,
}

impl EngineLoop {
    async fn run(mut self, tick: Duration) {
        let mut ticker = interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_position_event = Instant::now();

        self.flush();

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        None | Some(EngineCommand::Shutdown) => break,
                        Some(EngineCommand::Status(reply)) => {
                            let _ = reply.send(self.adapter.status());
                        }
                        Some(command) => self.apply(command),
                    }
                }
                _ = ticker.tick() => {
                    self.adapter.tick();

                    if self.adapter.player_state().is_playing()
                        && last_position_event.elapsed() >= self.position_interval
                    {
                        last_position_event = Instant::now();
                        let snapshot = self.adapter.status();
                        trace!("Position {}ms", snapshot.position_ms);
                        self.notify(EngineNotification::Session {
                            kind: SessionEventKind::PositionChanged,
                            snapshot,
                        });
                    }
                }
            }

            self.position_ms
                .store(self.adapter.position_ms(), Ordering::Relaxed);
            self.flush();
        }

        self.adapter.release();
        self.position_ms.store(0, Ordering::Relaxed);
        debug!("Engine loop exited");
    }

    fn apply(&mut self, command: EngineCommand) {
        debug!("Engine command: {:?}", command);
        match command {
            EngineCommand::SetItems {
                tracks,
                start_index,
            } => self.adapter.set_items(tracks, start_index),
            EngineCommand::Play(index) => self.adapter.play(index),
            EngineCommand::Resume => self.adapter.resume(),
            EngineCommand::Pause => self.adapter.pause(),
            EngineCommand::TogglePlayPause => self.adapter.toggle_play_pause(),
            EngineCommand::Stop => self.adapter.stop(),
            EngineCommand::SeekTo(position_ms) => self.adapter.seek_to(position_ms),
            EngineCommand::SkipNext => self.adapter.skip_to_next(),
            EngineCommand::SkipPrevious => self.adapter.skip_to_previous(),
            EngineCommand::ToggleShuffle => self.adapter.toggle_shuffle(),
            EngineCommand::ToggleRepeatOne => self.adapter.toggle_repeat_one(),
            EngineCommand::SetRepeatMode(mode) => self.adapter.set_repeat_mode(mode),
            // Handled by the loop
            EngineCommand::Status(_) | EngineCommand::Shutdown => {}
        }
    }

    /// Forward queued adapter updates; repeated kinds in one batch collapse
    fn flush(&mut self) {
        let mut last_kind = None;
        for update in self.adapter.take_updates() {
            match update {
                EngineUpdate::Session(kind) => {
                    if last_kind == Some(kind) {
                        continue;
                    }
                    last_kind = Some(kind);
                    let snapshot = self.adapter.status();
                    self.notify(EngineNotification::Session { kind, snapshot });
                }
                EngineUpdate::AudioSession(session) => {
                    self.notify(EngineNotification::AudioSession(session));
                }
            }
        }
    }

    fn notify(&self, notification: EngineNotification) {
        if self.notifications.send(notification).is_err() {
            trace!("No notification receiver");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{MediaEngine, VirtualEngine};
    use playit_common::PlayerState;
    use tokio::time::timeout;

    fn config() -> PlayerConfig {
        PlayerConfig {
            engine_tick_ms: 10,
            position_interval_ms: 100,
            ..Default::default()
        }
    }

    fn tracks() -> Vec<Track> {
        vec![
            Track::new("a", "A", "X")
                .with_uri("https://example.test/a.mp3")
                .with_duration_ms(60_000),
            Track::new("b", "B", "X")
                .with_uri("https://example.test/b.mp3")
                .with_duration_ms(60_000),
        ]
    }

    fn factory() -> EngineFactory {
        Box::new(|| -> Box<dyn MediaEngine> {
            Box::new(VirtualEngine::new().with_prepare_delay(Duration::from_millis(5)))
        })
    }

    async fn wait_for_state(
        rx: &mut mpsc::UnboundedReceiver<EngineNotification>,
        wanted: PlayerState,
    ) -> PlaybackSnapshot {
        loop {
            let notification = timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("timed out waiting for engine")
                .expect("engine channel closed");
            if let EngineNotification::Session { snapshot, .. } = notification {
                if snapshot.state == wanted {
                    return snapshot;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_engine_runs_on_named_thread_and_plays() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut handle = EngineHandle::spawn(&config(), factory(), tx).unwrap();
        assert!(handle.is_running());

        handle
            .send(EngineCommand::SetItems {
                tracks: tracks(),
                start_index: 0,
            })
            .unwrap();
        handle.send(EngineCommand::Play(1)).unwrap();

        let snapshot = wait_for_state(&mut rx, PlayerState::Playing).await;
        assert_eq!(snapshot.current_track.unwrap().id, "b");

        handle.release().await.unwrap();
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn test_audio_session_is_announced() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut handle = EngineHandle::spawn(&config(), factory(), tx).unwrap();
        handle
            .send(EngineCommand::SetItems {
                tracks: tracks(),
                start_index: 0,
            })
            .unwrap();
        handle.send(EngineCommand::Play(0)).unwrap();

        let session = loop {
            match timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap() {
                EngineNotification::AudioSession(id) => break id,
                _ => continue,
            }
        };
        assert!(session.is_valid());
        handle.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_position_is_published_and_status_answers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut handle = EngineHandle::spawn(&config(), factory(), tx).unwrap();
        handle
            .send(EngineCommand::SetItems {
                tracks: tracks(),
                start_index: 0,
            })
            .unwrap();
        handle.send(EngineCommand::Play(0)).unwrap();
        wait_for_state(&mut rx, PlayerState::Playing).await;

        handle.send(EngineCommand::SeekTo(30_000)).unwrap();
        let status = handle.status().await.unwrap();
        assert!(status.position_ms >= 30_000);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.position_ms() >= 30_000);

        handle.release().await.unwrap();
        assert!(handle.send(EngineCommand::Resume).is_err());
    }

    #[tokio::test]
    async fn test_zero_tick_still_runs() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let config = PlayerConfig {
            engine_tick_ms: 0,
            ..config()
        };
        let mut handle = EngineHandle::spawn(&config, factory(), tx).unwrap();
        handle
            .send(EngineCommand::SetItems {
                tracks: tracks(),
                start_index: 0,
            })
            .unwrap();
        handle.send(EngineCommand::Play(0)).unwrap();
        wait_for_state(&mut rx, PlayerState::Playing).await;

        handle.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_toggle_sees_commands_queued_before_it() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut handle = EngineHandle::spawn(&config(), factory(), tx).unwrap();
        handle
            .send(EngineCommand::SetItems {
                tracks: tracks(),
                start_index: 0,
            })
            .unwrap();
        handle.send(EngineCommand::Play(0)).unwrap();
        wait_for_state(&mut rx, PlayerState::Playing).await;

        handle.send(EngineCommand::Pause).unwrap();
        handle.send(EngineCommand::Resume).unwrap();
        handle.send(EngineCommand::TogglePlayPause).unwrap();
        let status = handle.status().await.unwrap();
        assert_eq!(status.state, PlayerState::Paused);

        handle.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_release_twice_is_harmless() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut handle = EngineHandle::spawn(&config(), factory(), tx).unwrap();
        handle.release().await.unwrap();
        handle.release().await.unwrap();
    }
}
