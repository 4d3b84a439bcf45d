//! Persisted player settings
//!
//! Effects settings and favorites are persisted independently of the live
//! effects processors, so they survive session restarts and can be applied
//! whenever a processor becomes available.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Maximum bass-boost and virtualizer strength
pub const MAX_EFFECT_STRENGTH: u16 = 1000;

/// Upper bound on stored equalizer bands
pub const MAX_EQ_BANDS: u16 = 32;

/// Current settings schema version
pub const SETTINGS_VERSION: u32 = 1;

/// Equalizer / bass-boost / virtualizer settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectsSettings {
    pub enabled: bool,
    /// Selected preset name; `None` means custom band levels
    pub preset: Option<String>,
    /// Per-band gain in millibels, indexed by band
    pub band_levels: Vec<i16>,
    /// 0-1000
    pub bass_boost: u16,
    /// 0-1000
    pub virtualizer: u16,
}

impl Default for EffectsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            preset: None,
            band_levels: Vec::new(),
            bass_boost: 0,
            virtualizer: 0,
        }
    }
}

/// Everything the persistence collaborator stores for the player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerSettings {
    /// Settings schema version for future migrations
    pub version: u32,
    pub effects: EffectsSettings,
    /// Ids of tracks marked favorite
    pub favorites: BTreeSet<String>,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            effects: EffectsSettings::default(),
            favorites: BTreeSet::new(),
        }
    }
}

/// A single user-driven settings change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsField {
    EffectsEnabled(bool),
    Preset(Option<String>),
    BandLevel { band: u16, level: i16 },
    BandLevels(Vec<i16>),
    BassBoost(u16),
    Virtualizer(u16),
    ToggleFavorite(String),
}

impl PlayerSettings {
    /// Apply one change. Returns true when the settings actually changed.
    pub fn apply(&mut self, field: SettingsField) -> bool {
        let before = self.clone();
        match field {
            SettingsField::EffectsEnabled(enabled) => self.effects.enabled = enabled,
            SettingsField::Preset(preset) => self.effects.preset = preset,
            SettingsField::BandLevel { band, .. } if band >= MAX_EQ_BANDS => {
                warn!("Ignoring level for band {}: at most {} bands", band, MAX_EQ_BANDS);
            }
            SettingsField::BandLevel { band, level } => {
                let band = band as usize;
                if self.effects.band_levels.len() <= band {
                    self.effects.band_levels.resize(band + 1, 0);
                }
                self.effects.band_levels[band] = level;
                // Hand-tuned bands no longer match a named preset
                self.effects.preset = None;
            }
            SettingsField::BandLevels(mut levels) => {
                levels.truncate(MAX_EQ_BANDS as usize);
                self.effects.band_levels = levels;
            }
            SettingsField::BassBoost(strength) => {
                self.effects.bass_boost = strength.min(MAX_EFFECT_STRENGTH)
            }
            SettingsField::Virtualizer(strength) => {
                self.effects.virtualizer = strength.min(MAX_EFFECT_STRENGTH)
            }
            SettingsField::ToggleFavorite(id) => {
                if !self.favorites.remove(&id) {
                    self.favorites.insert(id);
                }
            }
        }
        *self != before
    }

    pub fn is_favorite(&self, track_id: &str) -> bool {
        self.favorites.contains(track_id)
    }

    /// Load settings from a TOML file, or return defaults if it doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let settings: PlayerSettings = toml::from_str(&content)?;

        if settings.version > SETTINGS_VERSION {
            warn!(
                "Settings file {} has newer schema version {} (supported: {})",
                path.display(),
                settings.version,
                SETTINGS_VERSION
            );
        }

        debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Save settings to a TOML file, creating parent directories as needed
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;

        // Write-then-rename so a crash never leaves a truncated file
        let tmp = path.with_extension("toml.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to replace {}: {}", path.display(), e),
            ))
        })?;

        debug!("Saved settings to {}", path.display());
        Ok(())
    }
}
