//! User-facing effects controls
//!
//! Applies each change to the live chain and persists it, so the same
//! settings come back after a restart or when the engine moves to a new
//! audio session.

use super::AudioEffectsChain;
use crate::error::Result;
use crate::settings::SettingsStore;
use playit_common::settings::MAX_EQ_BANDS;
use playit_common::{EffectsSettings, SettingsField};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Effects controls backed by a [`SettingsStore`]
#[derive(Clone)]
pub struct EffectsController {
    chain: Arc<Mutex<AudioEffectsChain>>,
    store: Arc<dyn SettingsStore>,
}

impl EffectsController {
    pub fn new(chain: Arc<Mutex<AudioEffectsChain>>, store: Arc<dyn SettingsStore>) -> Self {
        Self { chain, store }
    }

    /// Persisted effects settings
    pub fn settings(&self) -> EffectsSettings {
        self.store.current().effects
    }

    pub async fn set_enabled(&self, enabled: bool) -> Result<()> {
        let mut chain = self.chain.lock().await;
        chain.set_enabled(enabled);
        self.persist(&mut chain, SettingsField::EffectsEnabled(enabled))
    }

    /// Load preset `index`; returns its name when the equalizer accepted it
    pub async fn apply_preset(&self, index: u16) -> Result<Option<String>> {
        let mut chain = self.chain.lock().await;
        let Some(name) = chain.apply_preset(index) else {
            debug!("Preset {} not applied", index);
            return Ok(None);
        };

        let levels: Vec<i16> = (0..chain.band_count()).map(|b| chain.band_level(b)).collect();
        self.persist(&mut chain, SettingsField::BandLevels(levels))?;
        self.persist(&mut chain, SettingsField::Preset(Some(name.clone())))?;
        Ok(Some(name))
    }

    /// Set and persist one band. Bands the equalizer does not have are
    /// ignored; while detached the last seen equalizer bounds the change.
    pub async fn set_band_level(&self, band: u16, level: i16) -> Result<()> {
        let mut chain = self.chain.lock().await;
        let level = match chain.band_layout() {
            Some((bands, _)) if band >= bands => {
                debug!("Band {} ignored: equalizer has {} bands", band, bands);
                return Ok(());
            }
            Some((_, (min, max))) => level.clamp(min, max),
            None if band >= MAX_EQ_BANDS => {
                debug!("Band {} ignored: no equalizer seen yet", band);
                return Ok(());
            }
            None => level,
        };
        chain.set_band_level(band, level);

        // Persist what the equalizer actually took when one is attached
        let level = if chain.band_count() > band {
            chain.band_level(band)
        } else {
            level
        };
        self.persist(&mut chain, SettingsField::BandLevel { band, level })
    }

    pub async fn set_bass_boost(&self, strength: u16) -> Result<()> {
        let mut chain = self.chain.lock().await;
        chain.set_bass_boost(strength);
        self.persist(&mut chain, SettingsField::BassBoost(strength))
    }

    pub async fn set_virtualizer(&self, strength: u16) -> Result<()> {
        let mut chain = self.chain.lock().await;
        chain.set_virtualizer(strength);
        self.persist(&mut chain, SettingsField::Virtualizer(strength))
    }

    pub async fn presets(&self) -> Vec<String> {
        self.chain.lock().await.presets()
    }

    pub async fn band_count(&self) -> u16 {
        self.chain.lock().await.band_count()
    }

    pub async fn band_level_range(&self) -> (i16, i16) {
        self.chain.lock().await.band_level_range()
    }

    pub async fn band_level(&self, band: u16) -> i16 {
        self.chain.lock().await.band_level(band)
    }

    pub async fn center_frequency(&self, band: u16) -> u32 {
        self.chain.lock().await.center_frequency(band)
    }

    pub async fn bass_boost_strength(&self) -> u16 {
        self.chain.lock().await.bass_boost_strength()
    }

    pub async fn virtualizer_strength(&self) -> u16 {
        self.chain.lock().await.virtualizer_strength()
    }

    pub async fn is_attached(&self) -> bool {
        self.chain.lock().await.is_attached()
    }

    fn persist(&self, chain: &mut AudioEffectsChain, field: SettingsField) -> Result<()> {
        let settings = self.store.set(field)?;
        if !chain.is_attached() {
            // Nothing to hear yet; make sure the next attach picks this up
            chain.apply_settings(&settings.effects);
        }
        Ok(())
    }
}
