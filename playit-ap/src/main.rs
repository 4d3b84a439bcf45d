//! PlayIt Audio Playback (playit-ap) - Main entry point
//!
//! Headless player: queues the given locators (or a playlist file), plays
//! them through the session host and logs every snapshot until the queue
//! ends or the process is interrupted.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use playit_ap::effects::{EffectsProvider, SoftwareEffects, UnsupportedEffects};
use playit_ap::engine::{EngineFactory, MediaEngine, VirtualEngine};
use playit_ap::settings::TomlSettingsStore;
use playit_ap::signals::SystemSignals;
use playit_ap::source::{PlaylistFile, TrackSource};
use playit_ap::{HostDeps, SessionClient, SessionService};
use playit_common::config::PlayerConfig;
use playit_common::time::format_time;
use playit_common::{PlaybackSnapshot, PlayerState, RepeatMode, Track};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RepeatArg {
    Off,
    One,
    All,
}

impl From<RepeatArg> for RepeatMode {
    fn from(arg: RepeatArg) -> Self {
        match arg {
            RepeatArg::Off => RepeatMode::Off,
            RepeatArg::One => RepeatMode::One,
            RepeatArg::All => RepeatMode::All,
        }
    }
}

/// Command-line arguments for playit-ap
#[derive(Parser, Debug)]
#[command(name = "playit-ap")]
#[command(about = "Headless playback session for PlayIt")]
#[command(version)]
struct Args {
    /// Files or URLs to play, in order
    #[arg(required_unless_present = "playlist")]
    locators: Vec<String>,

    /// TOML playlist to load instead of locators
    #[arg(short, long, conflicts_with = "locators")]
    playlist: Option<PathBuf>,

    /// Track id within the playlist to start from
    #[arg(long, requires = "playlist")]
    track: Option<String>,

    /// Configuration file (overrides PLAYIT_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    shuffle: bool,

    #[arg(long, value_enum, default_value_t = RepeatArg::Off)]
    repeat: RepeatArg,

    /// Equalizer preset index to apply at startup
    #[arg(long)]
    preset: Option<u16>,

    /// Run without the effects chain
    #[arg(long)]
    no_effects: bool,

    /// Duration assumed for tracks without one, in seconds
    #[arg(long, default_value = "180")]
    default_duration_secs: u64,

    /// Print snapshots as JSON lines on stdout
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "playit_ap=debug,playit_common=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!(
        "Starting playit-ap {} ({}, {} build, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_PROFILE"),
        env!("BUILD_TIMESTAMP")
    );

    let config = PlayerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    info!("Settings file: {}", config.settings_path.display());

    let settings = Arc::new(TomlSettingsStore::open_or_default(&config.settings_path));
    let effects: Arc<dyn EffectsProvider> = if args.no_effects {
        Arc::new(UnsupportedEffects)
    } else {
        Arc::new(SoftwareEffects::default())
    };

    let default_duration_ms = args.default_duration_secs.saturating_mul(1000);
    let engine_factory: EngineFactory = Box::new(move || -> Box<dyn MediaEngine> {
        Box::new(VirtualEngine::new().with_default_duration_ms(default_duration_ms))
    });

    let service = Arc::new(SessionService::new(
        config,
        HostDeps {
            engine_factory,
            effects,
            settings,
            signals: SystemSignals::new(),
        },
    ));
    let client = SessionClient::new(service.clone());

    let (finished_tx, mut finished) = watch::channel(false);
    let json = args.json;
    let played = AtomicBool::new(false);
    client.set_listener(move |snapshot: PlaybackSnapshot| {
        report(&snapshot, json);

        match snapshot.state {
            PlayerState::Playing => played.store(true, Ordering::Relaxed),
            PlayerState::Stopped if played.load(Ordering::Relaxed) => {
                finished_tx.send_replace(true);
            }
            PlayerState::Error(_) => {
                finished_tx.send_replace(true);
            }
            _ => {}
        }
    });

    client
        .wait_connected()
        .await
        .context("Failed to start playback session")?;

    if let Some(index) = args.preset {
        if let Some(controller) = client.effects() {
            match controller.apply_preset(index).await {
                Ok(Some(name)) => info!("Equalizer preset: {}", name),
                Ok(None) => warn!("Preset {} is not available", index),
                Err(e) => warn!("Failed to apply preset {}: {}", index, e),
            }
        }
    }

    client.set_repeat_mode(args.repeat.into());
    if args.shuffle {
        client.toggle_shuffle();
    }

    if let Some(path) = args.playlist {
        let playlist = PlaylistFile::new(path);
        match args.track.as_deref() {
            Some(track_id) => {
                let found = client
                    .play_track_from(&playlist, track_id)
                    .await
                    .context("Failed to load playlist")?;
                if !found {
                    anyhow::bail!("Track '{}' is not playable from {}", track_id, playlist.path().display());
                }
            }
            None => {
                let tracks = playlist.load_tracks().await.context("Failed to load playlist")?;
                client.play_tracks(tracks, 0);
            }
        }
    } else {
        client.play_tracks(tracks_from_locators(&args.locators), 0);
    }

    tokio::select! {
        _ = shutdown_signal() => {}
        _ = finished.wait_for(|done| *done) => {
            info!("Queue finished");
        }
    }

    client.destroy();
    if let Err(e) = service.shutdown().await {
        error!("Session shutdown failed: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}

/// Tracks for bare locators; the title is the last path segment
fn tracks_from_locators(locators: &[String]) -> Vec<Track> {
    locators
        .iter()
        .map(|locator| {
            let title = locator
                .trim_end_matches('/')
                .rsplit(['/', '\\'])
                .next()
                .filter(|name| !name.is_empty())
                .unwrap_or(locator.as_str())
                .to_string();
            Track::new(locator.clone(), title, "").with_uri(locator)
        })
        .collect()
}

fn report(snapshot: &PlaybackSnapshot, json: bool) {
    if json {
        match serde_json::to_string(snapshot) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("Failed to serialize snapshot: {}", e),
        }
        return;
    }

    let title = snapshot
        .current_track
        .as_ref()
        .map(|t| t.title.as_str())
        .unwrap_or("-");
    info!(
        "[{:?}] {} {}/{} (shuffle {}, repeat {:?})",
        snapshot.state,
        title,
        format_time(snapshot.position_ms as i64),
        format_time(snapshot.duration_ms as i64),
        if snapshot.shuffle_enabled { "on" } else { "off" },
        snapshot.repeat_mode
    );
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
