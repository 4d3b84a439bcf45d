//! Track data model
//!
//! A [`Track`] is an immutable value describing one playable item. Queues hold
//! ordered copies; identity is the `id` field.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Where the audio for a track lives
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TrackLocator {
    /// File on local storage
    LocalFile(PathBuf),
    /// Remotely hosted stream (any URI with a non-file scheme)
    Remote(String),
}

impl TrackLocator {
    /// Parse a locator string as handed out by a catalog or library scan.
    ///
    /// Returns `None` for empty input. `file://` URIs and bare paths become
    /// [`TrackLocator::LocalFile`]; anything else carrying a scheme is remote.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        if let Some(path) = raw.strip_prefix("file://") {
            if path.is_empty() {
                return None;
            }
            return Some(TrackLocator::LocalFile(PathBuf::from(path)));
        }

        if has_uri_scheme(raw) {
            Some(TrackLocator::Remote(raw.to_string()))
        } else {
            Some(TrackLocator::LocalFile(PathBuf::from(raw)))
        }
    }

    /// Locator rendered as a URI-like string for the media engine
    pub fn uri(&self) -> String {
        match self {
            TrackLocator::LocalFile(path) => path.to_string_lossy().into_owned(),
            TrackLocator::Remote(url) => url.clone(),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, TrackLocator::LocalFile(_))
    }
}

impl fmt::Display for TrackLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uri())
    }
}

/// True when `raw` starts with `scheme://` (RFC 3986 scheme characters)
pub fn has_uri_scheme(raw: &str) -> bool {
    match raw.split_once("://") {
        Some((scheme, _)) => {
            let mut chars = scheme.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
                && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

/// One playable item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Stable identifier (unique within a queue)
    pub id: String,
    pub title: String,
    pub artist: String,
    /// Duration in milliseconds, when the source knows it
    pub duration_ms: Option<u64>,
    /// Audio location. Collaborators may hand out tracks without one; those
    /// are never enqueued.
    pub locator: Option<TrackLocator>,
    /// Artwork URI
    pub artwork: Option<String>,
    pub is_favorite: bool,
}

impl Track {
    /// Create a track with no locator, duration or artwork
    pub fn new(id: impl Into<String>, title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: artist.into(),
            duration_ms: None,
            locator: None,
            artwork: None,
            is_favorite: false,
        }
    }

    pub fn with_locator(mut self, locator: TrackLocator) -> Self {
        self.locator = Some(locator);
        self
    }

    /// Parse and attach a locator; empty strings leave the track without one
    pub fn with_uri(mut self, raw: &str) -> Self {
        self.locator = TrackLocator::parse(raw);
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_artwork(mut self, artwork: impl Into<String>) -> Self {
        self.artwork = Some(artwork.into());
        self
    }

    pub fn with_favorite(mut self, is_favorite: bool) -> Self {
        self.is_favorite = is_favorite;
        self
    }

    /// Local (on-device) vs remote (streamed) track
    pub fn is_local(&self) -> bool {
        self.locator.as_ref().map(TrackLocator::is_local).unwrap_or(false)
    }

    /// Whether the track can be handed to the engine
    pub fn is_playable(&self) -> bool {
        self.locator.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_remote_locator() {
        let locator = TrackLocator::parse("https://cdn.example.com/a.mp3").unwrap();
        assert_eq!(locator, TrackLocator::Remote("https://cdn.example.com/a.mp3".to_string()));
        assert!(!locator.is_local());
    }

    #[test]
    fn test_parse_file_uri_and_bare_path() {
        let from_uri = TrackLocator::parse("file:///music/a.flac").unwrap();
        assert_eq!(from_uri, TrackLocator::LocalFile(PathBuf::from("/music/a.flac")));

        let bare = TrackLocator::parse("/music/b.mp3").unwrap();
        assert!(bare.is_local());
        assert_eq!(bare.uri(), "/music/b.mp3");
    }

    #[test]
    fn test_parse_empty_is_none() {
        assert!(TrackLocator::parse("").is_none());
        assert!(TrackLocator::parse("   ").is_none());
        assert!(TrackLocator::parse("file://").is_none());
    }

    #[test]
    fn test_has_uri_scheme() {
        assert!(has_uri_scheme("content://media/external/audio/12"));
        assert!(has_uri_scheme("ftp://host/x"));
        assert!(!has_uri_scheme("track-42"));
        assert!(!has_uri_scheme("://missing"));
        assert!(!has_uri_scheme("1abc://x"));
    }

    #[test]
    fn test_track_locality_follows_locator() {
        let local = Track::new("1", "Song", "Artist").with_uri("/music/song.mp3");
        let remote = Track::new("2", "Song", "Artist").with_uri("https://x/y.mp3");
        let missing = Track::new("3", "Song", "Artist");

        assert!(local.is_local());
        assert!(!remote.is_local());
        assert!(!missing.is_local());
        assert!(!missing.is_playable());
    }

    #[test]
    fn test_track_serde_roundtrip_keeps_locator_kind() {
        let track = Track::new("7", "T", "A")
            .with_uri("https://x/y.mp3")
            .with_duration_ms(1234)
            .with_favorite(true);
        let json = serde_json::to_string(&track).unwrap();
        let back: Track = serde_json::from_str(&json).unwrap();
        assert_eq!(back, track);
    }
}
