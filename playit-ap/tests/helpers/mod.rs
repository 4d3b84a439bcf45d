//! Shared setup for session integration tests
//!
//! Builds a session service around a fast virtual engine, the software
//! effects chain and in-memory settings.

#![allow(dead_code)]

use playit_ap::effects::SoftwareEffects;
use playit_ap::engine::{MediaEngine, VirtualEngine};
use playit_ap::settings::MemorySettingsStore;
use playit_ap::signals::SystemSignals;
use playit_ap::{HostDeps, SessionService};
use playit_common::config::PlayerConfig;
use playit_common::events::SessionEvent;
use playit_common::{PlaybackSnapshot, PlayerSettings, Track};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio::time::timeout;

pub const WAIT: Duration = Duration::from_secs(5);

pub struct TestSession {
    pub service: Arc<SessionService>,
    pub signals: SystemSignals,
    pub settings: Arc<MemorySettingsStore>,
}

pub fn test_config() -> PlayerConfig {
    PlayerConfig {
        engine_tick_ms: 10,
        position_interval_ms: 100,
        engine_thread_name: "playit-engine-test".to_string(),
        ..PlayerConfig::default()
    }
}

pub fn start_session() -> TestSession {
    start_session_with(PlayerSettings::default())
}

pub fn start_session_with(settings: PlayerSettings) -> TestSession {
    let signals = SystemSignals::new();
    let settings = Arc::new(MemorySettingsStore::new(settings));

    let deps = HostDeps {
        engine_factory: Box::new(|| -> Box<dyn MediaEngine> {
            Box::new(VirtualEngine::new().with_prepare_delay(Duration::from_millis(5)))
        }),
        effects: Arc::new(SoftwareEffects::default()),
        settings: settings.clone(),
        signals: signals.clone(),
    };

    TestSession {
        service: Arc::new(SessionService::new(test_config(), deps)),
        signals,
        settings,
    }
}

/// Remote track the virtual engine accepts
pub fn remote_track(id: &str, duration_ms: u64) -> Track {
    Track::new(id, format!("Song {}", id), "Band")
        .with_uri(&format!("https://cdn.example.test/{}.mp3", id))
        .with_duration_ms(duration_ms)
}

pub fn remote_tracks(count: usize, duration_ms: u64) -> Vec<Track> {
    (0..count)
        .map(|i| remote_track(&format!("t{}", i), duration_ms))
        .collect()
}

/// Next published snapshot matching `pred`
pub async fn wait_for<F>(events: &mut broadcast::Receiver<SessionEvent>, mut pred: F) -> PlaybackSnapshot
where
    F: FnMut(&PlaybackSnapshot) -> bool,
{
    timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event.snapshot) => return event.snapshot,
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => panic!("session event stream closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for snapshot")
}

/// Next snapshot delivered to a client listener matching `pred`
pub async fn wait_for_delivery<F>(
    deliveries: &mut mpsc::UnboundedReceiver<PlaybackSnapshot>,
    mut pred: F,
) -> PlaybackSnapshot
where
    F: FnMut(&PlaybackSnapshot) -> bool,
{
    timeout(WAIT, async {
        loop {
            match deliveries.recv().await {
                Some(snapshot) if pred(&snapshot) => return snapshot,
                Some(_) => {}
                None => panic!("listener dropped"),
            }
        }
    })
    .await
    .expect("timed out waiting for listener delivery")
}
