//! Effects chain bound to the active audio session

use super::{AudioSessionId, BassBoost, EffectsProvider, Equalizer, Virtualizer};
use playit_common::settings::MAX_EFFECT_STRENGTH;
use playit_common::EffectsSettings;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Equalizer, bass boost and virtualizer for one audio session
///
/// Every operation is safe in every state. Processors the provider could not
/// build are simply absent and their operations do nothing; queries return
/// zero-valued defaults.
///
/// The chain remembers the settings it was last told to apply (plus any
/// individual changes made while attached) and re-applies them on every
/// successful [`attach`](Self::attach).
pub struct AudioEffectsChain {
    provider: Arc<dyn EffectsProvider>,
    session: Option<AudioSessionId>,
    equalizer: Option<Box<dyn Equalizer>>,
    bass_boost: Option<Box<dyn BassBoost>>,
    virtualizer: Option<Box<dyn Virtualizer>>,
    remembered: Option<EffectsSettings>,
    /// Band count and level range of the most recent equalizer
    last_layout: Option<(u16, (i16, i16))>,
}

impl AudioEffectsChain {
    pub fn new(provider: Arc<dyn EffectsProvider>) -> Self {
        Self {
            provider,
            session: None,
            equalizer: None,
            bass_boost: None,
            virtualizer: None,
            remembered: None,
            last_layout: None,
        }
    }

    /// Bind to `session`, releasing whatever was attached before.
    ///
    /// An invalid session leaves the chain detached.
    pub fn attach(&mut self, session: AudioSessionId) {
        self.release();

        if !session.is_valid() {
            debug!("Ignoring attach to invalid audio session");
            return;
        }

        self.equalizer = match self.provider.create_equalizer(session) {
            Ok(mut eq) => {
                eq.set_enabled(true);
                self.last_layout = Some((eq.band_count(), eq.band_level_range()));
                Some(eq)
            }
            Err(e) => {
                warn!("Equalizer unavailable for session {}: {}", session, e);
                None
            }
        };

        self.bass_boost = match self.provider.create_bass_boost(session) {
            Ok(mut bass) => {
                bass.set_enabled(true);
                Some(bass)
            }
            Err(e) => {
                warn!("Bass boost unavailable for session {}: {}", session, e);
                None
            }
        };

        self.virtualizer = match self.provider.create_virtualizer(session) {
            Ok(mut virtualizer) => {
                virtualizer.set_enabled(false);
                Some(virtualizer)
            }
            Err(e) => {
                warn!("Virtualizer unavailable for session {}: {}", session, e);
                None
            }
        };

        if !self.is_attached() {
            self.provider.end_session(session);
            return;
        }

        self.session = Some(session);
        info!("Effects attached to audio session {}", session);

        if let Some(settings) = self.remembered.take() {
            self.apply_settings(&settings);
        }
    }

    /// Release all processors. Safe to call repeatedly and before any attach.
    pub fn release(&mut self) {
        if let Some(mut eq) = self.equalizer.take() {
            eq.release();
        }
        if let Some(mut bass) = self.bass_boost.take() {
            bass.release();
        }
        if let Some(mut virtualizer) = self.virtualizer.take() {
            virtualizer.release();
        }
        if let Some(session) = self.session.take() {
            self.provider.end_session(session);
            debug!("Effects released from audio session {}", session);
        }
    }

    /// True when at least one processor is bound
    pub fn is_attached(&self) -> bool {
        self.equalizer.is_some() || self.bass_boost.is_some() || self.virtualizer.is_some()
    }

    pub fn session(&self) -> Option<AudioSessionId> {
        self.session
    }

    /// Band count and level range of the attached equalizer, or of the last
    /// one seen when detached. `None` until an equalizer has been built.
    pub fn band_layout(&self) -> Option<(u16, (i16, i16))> {
        match self.equalizer.as_ref() {
            Some(eq) => Some((eq.band_count(), eq.band_level_range())),
            None => self.last_layout,
        }
    }

    /// Set one band, clamped into the equalizer's range
    pub fn set_band_level(&mut self, band: u16, level: i16) {
        let Some(eq) = self.equalizer.as_mut() else {
            return;
        };

        let (min, max) = eq.band_level_range();
        let clamped = level.clamp(min, max);
        if let Err(e) = eq.set_band_level(band, clamped) {
            debug!("set_band_level({}, {}) rejected: {}", band, clamped, e);
            return;
        }

        let settings = self.remembered.get_or_insert_with(EffectsSettings::default);
        let band = band as usize;
        if settings.band_levels.len() <= band {
            settings.band_levels.resize(band + 1, 0);
        }
        settings.band_levels[band] = clamped;
        settings.preset = None;
    }

    /// Set bass-boost strength, clamped to 0-1000
    pub fn set_bass_boost(&mut self, strength: u16) {
        let Some(bass) = self.bass_boost.as_mut() else {
            return;
        };

        let strength = strength.min(MAX_EFFECT_STRENGTH);
        if let Err(e) = bass.set_strength(strength) {
            debug!("set_bass_boost({}) rejected: {}", strength, e);
            return;
        }
        self.remembered
            .get_or_insert_with(EffectsSettings::default)
            .bass_boost = strength;
    }

    /// Set virtualizer strength, clamped to 0-1000. The virtualizer is
    /// enabled exactly when the strength is non-zero.
    pub fn set_virtualizer(&mut self, strength: u16) {
        let Some(virtualizer) = self.virtualizer.as_mut() else {
            return;
        };

        let strength = strength.min(MAX_EFFECT_STRENGTH);
        virtualizer.set_enabled(strength > 0);
        if let Err(e) = virtualizer.set_strength(strength) {
            debug!("set_virtualizer({}) rejected: {}", strength, e);
            return;
        }
        self.remembered
            .get_or_insert_with(EffectsSettings::default)
            .virtualizer = strength;
    }

    /// Load equalizer preset `preset`. Returns the preset name when applied.
    pub fn apply_preset(&mut self, preset: u16) -> Option<String> {
        let eq = self.equalizer.as_mut()?;

        if let Err(e) = eq.use_preset(preset) {
            debug!("apply_preset({}) rejected: {}", preset, e);
            return None;
        }

        let name = eq.presets().get(preset as usize).cloned();
        let levels: Vec<i16> = (0..eq.band_count())
            .map(|band| eq.band_level(band).unwrap_or(0))
            .collect();

        let settings = self.remembered.get_or_insert_with(EffectsSettings::default);
        settings.preset = name.clone();
        settings.band_levels = levels;
        name
    }

    /// Enable or disable the equalizer and bass boost. The virtualizer stays
    /// governed by its strength.
    pub fn set_enabled(&mut self, enabled: bool) {
        if !self.is_attached() {
            return;
        }
        if let Some(eq) = self.equalizer.as_mut() {
            eq.set_enabled(enabled);
        }
        if let Some(bass) = self.bass_boost.as_mut() {
            bass.set_enabled(enabled);
        }
        self.remembered
            .get_or_insert_with(EffectsSettings::default)
            .enabled = enabled;
    }

    /// Apply a persisted settings snapshot to whatever is attached.
    ///
    /// The snapshot is remembered and applied again on the next attach, so
    /// settings that arrive before the engine has a session are not lost.
    pub fn apply_settings(&mut self, settings: &EffectsSettings) {
        if self.is_attached() {
            self.set_enabled(settings.enabled);

            let preset_index = settings.preset.as_ref().and_then(|name| {
                self.presets()
                    .iter()
                    .position(|p| p == name)
                    .map(|i| i as u16)
            });
            match preset_index {
                Some(index) => {
                    self.apply_preset(index);
                }
                None => {
                    let bands = self.band_count() as usize;
                    for (band, &level) in settings.band_levels.iter().take(bands).enumerate() {
                        self.set_band_level(band as u16, level);
                    }
                }
            }

            self.set_bass_boost(settings.bass_boost);
            self.set_virtualizer(settings.virtualizer);
        }

        // Keep the caller's intent even where a processor is missing
        self.remembered = Some(settings.clone());
    }

    /// Settings that will be re-applied on the next attach
    pub fn remembered_settings(&self) -> Option<&EffectsSettings> {
        self.remembered.as_ref()
    }

    pub fn presets(&self) -> Vec<String> {
        self.equalizer.as_ref().map(|eq| eq.presets()).unwrap_or_default()
    }

    pub fn band_count(&self) -> u16 {
        self.equalizer.as_ref().map(|eq| eq.band_count()).unwrap_or(0)
    }

    pub fn band_level_range(&self) -> (i16, i16) {
        self.equalizer
            .as_ref()
            .map(|eq| eq.band_level_range())
            .unwrap_or((0, 0))
    }

    pub fn band_level(&self, band: u16) -> i16 {
        self.equalizer
            .as_ref()
            .and_then(|eq| eq.band_level(band).ok())
            .unwrap_or(0)
    }

    /// Center frequency of `band` in Hz
    pub fn center_frequency(&self, band: u16) -> u32 {
        self.equalizer
            .as_ref()
            .and_then(|eq| eq.center_frequency(band).ok())
            .unwrap_or(0)
    }

    pub fn bass_boost_strength(&self) -> u16 {
        self.bass_boost.as_ref().map(|b| b.strength()).unwrap_or(0)
    }

    pub fn virtualizer_strength(&self) -> u16 {
        self.virtualizer.as_ref().map(|v| v.strength()).unwrap_or(0)
    }

    pub fn is_enabled(&self) -> bool {
        self.equalizer
            .as_ref()
            .map(|eq| eq.is_enabled())
            .or_else(|| self.bass_boost.as_ref().map(|b| b.is_enabled()))
            .unwrap_or(false)
    }
}

impl Drop for AudioEffectsChain {
    fn drop(&mut self) {
        self.release();
    }
}
