//! Audio effects
//!
//! Equalizer, bass-boost and virtualizer processors bound to an engine audio
//! session. [`EffectsProvider`] constructs processors for a session id;
//! [`AudioEffectsChain`] owns whatever the provider managed to build and
//! degrades to no-ops for the rest.

mod chain;
mod controller;
pub mod dsp;
mod software;

pub use chain::AudioEffectsChain;
pub use controller::EffectsController;
pub use software::{EffectsPipeline, SoftwareEffects, EQ_BAND_LEVEL_RANGE, EQ_CENTER_FREQUENCIES_HZ};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Engine-assigned identifier of an audio output session
///
/// Zero is never a valid session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AudioSessionId(pub u32);

impl AudioSessionId {
    pub const INVALID: AudioSessionId = AudioSessionId(0);

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for AudioSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Multi-band equalizer bound to one audio session
pub trait Equalizer: Send {
    fn band_count(&self) -> u16;

    /// Supported (min, max) band level in millibels
    fn band_level_range(&self) -> (i16, i16);

    fn band_level(&self, band: u16) -> Result<i16>;

    /// Set one band. Levels outside the range are rejected.
    fn set_band_level(&mut self, band: u16, level: i16) -> Result<()>;

    /// Center frequency of `band` in Hz
    fn center_frequency(&self, band: u16) -> Result<u32>;

    fn presets(&self) -> Vec<String>;

    /// Load preset `preset` into the bands. Unknown presets are rejected.
    fn use_preset(&mut self, preset: u16) -> Result<()>;

    fn set_enabled(&mut self, enabled: bool);

    fn is_enabled(&self) -> bool;

    /// Detach from the session; the processor is inert afterwards
    fn release(&mut self);
}

/// Low-frequency boost bound to one audio session
pub trait BassBoost: Send {
    /// Strength 0-1000
    fn set_strength(&mut self, strength: u16) -> Result<()>;

    fn strength(&self) -> u16;

    fn set_enabled(&mut self, enabled: bool);

    fn is_enabled(&self) -> bool;

    fn release(&mut self);
}

/// Stereo widening bound to one audio session
pub trait Virtualizer: Send {
    /// Strength 0-1000
    fn set_strength(&mut self, strength: u16) -> Result<()>;

    fn strength(&self) -> u16;

    fn set_enabled(&mut self, enabled: bool);

    fn is_enabled(&self) -> bool;

    fn release(&mut self);
}

/// Builds effects processors for an audio session
///
/// Each processor is constructed independently; a device may support some
/// effects and not others.
pub trait EffectsProvider: Send + Sync {
    fn create_equalizer(&self, session: AudioSessionId) -> Result<Box<dyn Equalizer>>;

    fn create_bass_boost(&self, session: AudioSessionId) -> Result<Box<dyn BassBoost>>;

    fn create_virtualizer(&self, session: AudioSessionId) -> Result<Box<dyn Virtualizer>>;

    /// Forget per-session state once no processor is bound to `session`
    fn end_session(&self, _session: AudioSessionId) {}
}

/// Provider for devices without effects support
///
/// Every construction fails, so a chain built on it stays detached.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedEffects;

impl EffectsProvider for UnsupportedEffects {
    fn create_equalizer(&self, _session: AudioSessionId) -> Result<Box<dyn Equalizer>> {
        Err(Error::Effects("equalizer not supported".to_string()))
    }

    fn create_bass_boost(&self, _session: AudioSessionId) -> Result<Box<dyn BassBoost>> {
        Err(Error::Effects("bass boost not supported".to_string()))
    }

    fn create_virtualizer(&self, _session: AudioSessionId) -> Result<Box<dyn Virtualizer>> {
        Err(Error::Effects("virtualizer not supported".to_string()))
    }
}
