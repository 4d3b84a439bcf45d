//! Settings persistence
//!
//! [`SettingsStore`] is the seam between the session and wherever effects
//! settings and favorites are kept. Observers get a `watch` receiver that
//! always holds the latest snapshot.

use crate::error::Result;
use playit_common::{PlayerSettings, SettingsField};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Persistence collaborator for player settings
pub trait SettingsStore: Send + Sync {
    /// Watch the settings; the receiver starts with the current snapshot
    fn observe(&self) -> watch::Receiver<PlayerSettings>;

    /// Apply one change and return the resulting settings
    fn set(&self, field: SettingsField) -> Result<PlayerSettings>;

    fn current(&self) -> PlayerSettings {
        self.observe().borrow().clone()
    }

    /// Flip the favorite flag of `track_id`; returns the new flag
    fn toggle_favorite(&self, track_id: &str) -> Result<bool> {
        let settings = self.set(SettingsField::ToggleFavorite(track_id.to_string()))?;
        Ok(settings.is_favorite(track_id))
    }

    fn is_favorite(&self, track_id: &str) -> bool {
        self.observe().borrow().is_favorite(track_id)
    }
}

/// Settings kept in memory only
pub struct MemorySettingsStore {
    tx: watch::Sender<PlayerSettings>,
}

impl MemorySettingsStore {
    pub fn new(initial: PlayerSettings) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }
}

impl Default for MemorySettingsStore {
    fn default() -> Self {
        Self::new(PlayerSettings::default())
    }
}

impl SettingsStore for MemorySettingsStore {
    fn observe(&self) -> watch::Receiver<PlayerSettings> {
        self.tx.subscribe()
    }

    fn set(&self, field: SettingsField) -> Result<PlayerSettings> {
        debug!("Settings change: {:?}", field);
        self.tx.send_if_modified(|settings| settings.apply(field));
        Ok(self.tx.borrow().clone())
    }
}

/// Settings persisted to a TOML file
///
/// Every change is written through before observers are notified, so the
/// file never lags what observers have seen.
pub struct TomlSettingsStore {
    path: PathBuf,
    tx: watch::Sender<PlayerSettings>,
    write_lock: Mutex<()>,
}

impl TomlSettingsStore {
    /// Open the store, loading existing settings from `path` if present
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let settings = PlayerSettings::load(&path)?;
        info!("Settings store at {}", path.display());

        let (tx, _) = watch::channel(settings);
        Ok(Self {
            path,
            tx,
            write_lock: Mutex::new(()),
        })
    }

    /// Open the store, falling back to defaults if the file is unreadable
    pub fn open_or_default(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::open(path.clone()) {
            Ok(store) => store,
            Err(e) => {
                warn!(
                    "Could not read settings from {} ({}), starting from defaults",
                    path.display(),
                    e
                );
                let (tx, _) = watch::channel(PlayerSettings::default());
                Self {
                    path,
                    tx,
                    write_lock: Mutex::new(()),
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for TomlSettingsStore {
    fn observe(&self) -> watch::Receiver<PlayerSettings> {
        self.tx.subscribe()
    }

    fn set(&self, field: SettingsField) -> Result<PlayerSettings> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut updated = self.tx.borrow().clone();
        if !updated.apply(field) {
            return Ok(updated);
        }

        updated.save(&self.path)?;
        self.tx.send_replace(updated.clone());
        Ok(updated)
    }
}
