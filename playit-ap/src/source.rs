//! Track sources
//!
//! Where the client looks up a catalog when asked to play a track by id.
//! Loading runs on the caller's task, never on the engine thread.

use crate::error::{Error, Result};
use playit_common::Track;
use serde::Deserialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Catalog of tracks the session can play
pub trait TrackSource: Send + Sync {
    fn load_tracks(&self) -> impl Future<Output = Result<Vec<Track>>> + Send;
}

/// In-memory catalog
#[derive(Debug, Clone, Default)]
pub struct StaticTrackSource {
    tracks: Vec<Track>,
}

impl StaticTrackSource {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self { tracks }
    }
}

impl TrackSource for StaticTrackSource {
    async fn load_tracks(&self) -> Result<Vec<Track>> {
        Ok(self.tracks.clone())
    }
}

/// Playlist file in TOML:
///
/// ```toml
/// [[tracks]]
/// id = "intro"
/// title = "Intro"
/// artist = "Band"
/// uri = "https://cdn.example.com/intro.mp3"
/// duration_ms = 95000
/// ```
#[derive(Debug, Clone)]
pub struct PlaylistFile {
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct PlaylistDocument {
    #[serde(default)]
    tracks: Vec<PlaylistEntry>,
}

#[derive(Debug, Deserialize)]
struct PlaylistEntry {
    id: String,
    title: Option<String>,
    #[serde(default)]
    artist: String,
    uri: Option<String>,
    duration_ms: Option<u64>,
    artwork: Option<String>,
}

impl PlaylistEntry {
    fn into_track(self) -> Track {
        // Untitled entries show the last path segment of their locator
        let title = self.title.unwrap_or_else(|| {
            self.uri
                .as_deref()
                .and_then(|uri| uri.rsplit('/').next())
                .filter(|name| !name.is_empty())
                .unwrap_or(self.id.as_str())
                .to_string()
        });

        let mut track = Track::new(self.id, title, self.artist);
        if let Some(uri) = self.uri.as_deref() {
            track = track.with_uri(uri);
        }
        if let Some(duration_ms) = self.duration_ms {
            track = track.with_duration_ms(duration_ms);
        }
        if let Some(artwork) = self.artwork {
            track = track.with_artwork(artwork);
        }
        track
    }
}

impl PlaylistFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse playlist text
    pub fn parse(content: &str) -> Result<Vec<Track>> {
        let document: PlaylistDocument = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid playlist: {}", e)))?;

        let tracks: Vec<Track> = document
            .tracks
            .into_iter()
            .map(PlaylistEntry::into_track)
            .collect();

        let unplayable = tracks.iter().filter(|t| !t.is_playable()).count();
        if unplayable > 0 {
            warn!("{} playlist entries have no uri", unplayable);
        }
        Ok(tracks)
    }
}

impl TrackSource for PlaylistFile {
    async fn load_tracks(&self) -> Result<Vec<Track>> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let tracks = Self::parse(&content)?;
        debug!("Loaded {} tracks from {}", tracks.len(), self.path.display());
        Ok(tracks)
    }
}
