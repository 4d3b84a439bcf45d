//! Software effects provider
//!
//! Implements the three processors on top of a per-session [`EffectsPipeline`]
//! that filters interleaved `f32` frames. Processors created for the same
//! session share one pipeline, so parameter changes made through the
//! processors are heard by whoever runs [`SoftwareEffects::process`].

use super::dsp::{Biquad, BiquadCoefficients};
use super::{AudioSessionId, BassBoost, EffectsProvider, Equalizer, Virtualizer};
use crate::error::{Error, Result};
use playit_common::settings::MAX_EFFECT_STRENGTH;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Equalizer band centers in Hz
pub const EQ_CENTER_FREQUENCIES_HZ: [u32; 5] = [60, 230, 910, 3_600, 14_000];

/// Supported band level range in millibels
pub const EQ_BAND_LEVEL_RANGE: (i16, i16) = (-1500, 1500);

const EQ_BAND_Q: f64 = 1.0;

const BASS_BOOST_CUTOFF_HZ: f64 = 100.0;
const BASS_BOOST_Q: f64 = 0.707;
const BASS_BOOST_MAX_DB: f64 = 15.0;

/// Named band settings in millibels, one entry per band
const PRESETS: [(&str, [i16; 5]); 10] = [
    ("Normal", [300, 0, 0, 0, 300]),
    ("Classical", [500, 300, -200, 400, 400]),
    ("Dance", [600, 0, 200, 400, 100]),
    ("Flat", [0, 0, 0, 0, 0]),
    ("Folk", [300, 0, 0, 200, -100]),
    ("Heavy Metal", [400, 100, 900, 300, 0]),
    ("Hip Hop", [500, 300, 0, 100, 300]),
    ("Jazz", [400, 200, -200, 200, 500]),
    ("Pop", [-100, 200, 500, 100, -200]),
    ("Rock", [500, 300, -100, 300, 500]),
];

fn lock(pipeline: &Mutex<EffectsPipeline>) -> MutexGuard<'_, EffectsPipeline> {
    // A panic mid-update leaves plain parameter values behind; keep going
    pipeline.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// DSP state for one audio session
#[derive(Debug)]
pub struct EffectsPipeline {
    sample_rate: f64,
    channels: usize,

    eq_enabled: bool,
    eq_levels: [i16; 5],
    eq_filters: Vec<Biquad>,

    bass_enabled: bool,
    bass_strength: u16,
    bass_filter: Biquad,

    virtualizer_enabled: bool,
    virtualizer_strength: u16,
}

impl EffectsPipeline {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        let sample_rate = sample_rate.max(1) as f64;
        let channels = channels.max(1) as usize;
        Self {
            sample_rate,
            channels,
            eq_enabled: false,
            eq_levels: [0; 5],
            eq_filters: (0..EQ_CENTER_FREQUENCIES_HZ.len())
                .map(|_| Biquad::new(BiquadCoefficients::IDENTITY, channels))
                .collect(),
            bass_enabled: false,
            bass_strength: 0,
            bass_filter: Biquad::new(BiquadCoefficients::IDENTITY, channels),
            virtualizer_enabled: false,
            virtualizer_strength: 0,
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Run all enabled effects over interleaved frames in place
    pub fn process(&mut self, samples: &mut [f32]) {
        if self.eq_enabled {
            for filter in &mut self.eq_filters {
                filter.process_interleaved(samples);
            }
        }

        if self.bass_enabled && self.bass_strength > 0 {
            self.bass_filter.process_interleaved(samples);
        }

        if self.virtualizer_enabled && self.virtualizer_strength > 0 && self.channels == 2 {
            // Mid/side widening: scale the side signal up to 2x
            let width = 1.0 + self.virtualizer_strength as f32 / MAX_EFFECT_STRENGTH as f32;
            for frame in samples.chunks_exact_mut(2) {
                let mid = (frame[0] + frame[1]) * 0.5;
                let side = (frame[0] - frame[1]) * 0.5 * width;
                frame[0] = mid + side;
                frame[1] = mid - side;
            }
        }
    }

    fn set_eq_level(&mut self, band: usize, level: i16) {
        self.eq_levels[band] = level;
        let coefficients = BiquadCoefficients::peaking(
            self.sample_rate,
            EQ_CENTER_FREQUENCIES_HZ[band] as f64,
            EQ_BAND_Q,
            level as f64 / 100.0,
        );
        self.eq_filters[band].set_coefficients(coefficients);
    }

    fn set_bass_strength(&mut self, strength: u16) {
        self.bass_strength = strength;
        let gain_db = BASS_BOOST_MAX_DB * strength as f64 / MAX_EFFECT_STRENGTH as f64;
        self.bass_filter.set_coefficients(BiquadCoefficients::low_shelf(
            self.sample_rate,
            BASS_BOOST_CUTOFF_HZ,
            BASS_BOOST_Q,
            gain_db,
        ));
    }
}

/// In-process effects provider
pub struct SoftwareEffects {
    sample_rate: u32,
    channels: u16,
    sessions: Mutex<HashMap<AudioSessionId, Arc<Mutex<EffectsPipeline>>>>,
}

impl SoftwareEffects {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Pipeline for `session`, created on first use
    pub fn pipeline(&self, session: AudioSessionId) -> Arc<Mutex<EffectsPipeline>> {
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        sessions
            .entry(session)
            .or_insert_with(|| {
                debug!("Creating effects pipeline for audio session {}", session);
                Arc::new(Mutex::new(EffectsPipeline::new(self.sample_rate, self.channels)))
            })
            .clone()
    }

    /// Apply the session's effects to interleaved frames.
    ///
    /// This is the hook for an output stage that renders decoded audio; call
    /// it once per buffer. Sessions without processors pass through as-is.
    pub fn process(&self, session: AudioSessionId, samples: &mut [f32]) {
        let pipeline = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&session)
            .cloned();
        if let Some(pipeline) = pipeline {
            lock(&pipeline).process(samples);
        }
    }

    fn pipeline_for(&self, session: AudioSessionId) -> Result<Arc<Mutex<EffectsPipeline>>> {
        if !session.is_valid() {
            return Err(Error::Effects(format!("invalid audio session {}", session)));
        }
        Ok(self.pipeline(session))
    }
}

impl Default for SoftwareEffects {
    fn default() -> Self {
        Self::new(44_100, 2)
    }
}

impl EffectsProvider for SoftwareEffects {
    fn end_session(&self, session: AudioSessionId) {
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if sessions.remove(&session).is_some() {
            debug!("Removed effects pipeline for audio session {}", session);
        }
    }

    fn create_equalizer(&self, session: AudioSessionId) -> Result<Box<dyn Equalizer>> {
        Ok(Box::new(SoftwareEqualizer {
            pipeline: Some(self.pipeline_for(session)?),
        }))
    }

    fn create_bass_boost(&self, session: AudioSessionId) -> Result<Box<dyn BassBoost>> {
        Ok(Box::new(SoftwareBassBoost {
            pipeline: Some(self.pipeline_for(session)?),
        }))
    }

    fn create_virtualizer(&self, session: AudioSessionId) -> Result<Box<dyn Virtualizer>> {
        Ok(Box::new(SoftwareVirtualizer {
            pipeline: Some(self.pipeline_for(session)?),
        }))
    }
}

fn released() -> Error {
    Error::Effects("processor released".to_string())
}

/// `None` once released
struct SoftwareEqualizer {
    pipeline: Option<Arc<Mutex<EffectsPipeline>>>,
}

impl SoftwareEqualizer {
    fn check_band(band: u16) -> Result<usize> {
        let band = band as usize;
        if band < EQ_CENTER_FREQUENCIES_HZ.len() {
            Ok(band)
        } else {
            Err(Error::Effects(format!("band {} out of range", band)))
        }
    }
}

impl Equalizer for SoftwareEqualizer {
    fn band_count(&self) -> u16 {
        EQ_CENTER_FREQUENCIES_HZ.len() as u16
    }

    fn band_level_range(&self) -> (i16, i16) {
        EQ_BAND_LEVEL_RANGE
    }

    fn band_level(&self, band: u16) -> Result<i16> {
        let band = Self::check_band(band)?;
        let pipeline = self.pipeline.as_ref().ok_or_else(released)?;
        Ok(lock(pipeline).eq_levels[band])
    }

    fn set_band_level(&mut self, band: u16, level: i16) -> Result<()> {
        let band = Self::check_band(band)?;
        let (min, max) = EQ_BAND_LEVEL_RANGE;
        if !(min..=max).contains(&level) {
            return Err(Error::Effects(format!("band level {} out of range", level)));
        }
        let pipeline = self.pipeline.as_ref().ok_or_else(released)?;
        lock(pipeline).set_eq_level(band, level);
        Ok(())
    }

    fn center_frequency(&self, band: u16) -> Result<u32> {
        let band = Self::check_band(band)?;
        Ok(EQ_CENTER_FREQUENCIES_HZ[band])
    }

    fn presets(&self) -> Vec<String> {
        PRESETS.iter().map(|(name, _)| name.to_string()).collect()
    }

    fn use_preset(&mut self, preset: u16) -> Result<()> {
        let (name, levels) = PRESETS
            .get(preset as usize)
            .ok_or_else(|| Error::Effects(format!("preset {} out of range", preset)))?;
        let pipeline = self.pipeline.as_ref().ok_or_else(released)?;

        let mut pipeline = lock(pipeline);
        for (band, &level) in levels.iter().enumerate() {
            pipeline.set_eq_level(band, level);
        }
        debug!("Equalizer preset '{}' loaded", name);
        Ok(())
    }

    fn set_enabled(&mut self, enabled: bool) {
        if let Some(pipeline) = &self.pipeline {
            lock(pipeline).eq_enabled = enabled;
        }
    }

    fn is_enabled(&self) -> bool {
        self.pipeline
            .as_ref()
            .map(|p| lock(p).eq_enabled)
            .unwrap_or(false)
    }

    fn release(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            lock(&pipeline).eq_enabled = false;
        }
    }
}

struct SoftwareBassBoost {
    pipeline: Option<Arc<Mutex<EffectsPipeline>>>,
}

impl BassBoost for SoftwareBassBoost {
    fn set_strength(&mut self, strength: u16) -> Result<()> {
        if strength > MAX_EFFECT_STRENGTH {
            return Err(Error::Effects(format!("strength {} out of range", strength)));
        }
        let pipeline = self.pipeline.as_ref().ok_or_else(released)?;
        lock(pipeline).set_bass_strength(strength);
        Ok(())
    }

    fn strength(&self) -> u16 {
        self.pipeline
            .as_ref()
            .map(|p| lock(p).bass_strength)
            .unwrap_or(0)
    }

    fn set_enabled(&mut self, enabled: bool) {
        if let Some(pipeline) = &self.pipeline {
            lock(pipeline).bass_enabled = enabled;
        }
    }

    fn is_enabled(&self) -> bool {
        self.pipeline
            .as_ref()
            .map(|p| lock(p).bass_enabled)
            .unwrap_or(false)
    }

    fn release(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            lock(&pipeline).bass_enabled = false;
        }
    }
}

struct SoftwareVirtualizer {
    pipeline: Option<Arc<Mutex<EffectsPipeline>>>,
}

impl Virtualizer for SoftwareVirtualizer {
    fn set_strength(&mut self, strength: u16) -> Result<()> {
        if strength > MAX_EFFECT_STRENGTH {
            return Err(Error::Effects(format!("strength {} out of range", strength)));
        }
        let pipeline = self.pipeline.as_ref().ok_or_else(released)?;
        lock(pipeline).virtualizer_strength = strength;
        Ok(())
    }

    fn strength(&self) -> u16 {
        self.pipeline
            .as_ref()
            .map(|p| lock(p).virtualizer_strength)
            .unwrap_or(0)
    }

    fn set_enabled(&mut self, enabled: bool) {
        if let Some(pipeline) = &self.pipeline {
            lock(pipeline).virtualizer_enabled = enabled;
        }
    }

    fn is_enabled(&self) -> bool {
        self.pipeline
            .as_ref()
            .map(|p| lock(p).virtualizer_enabled)
            .unwrap_or(false)
    }

    fn release(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            lock(&pipeline).virtualizer_enabled = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SESSION: AudioSessionId = AudioSessionId(7);

    fn stereo_sine(frequency: f32, frames: usize) -> Vec<f32> {
        (0..frames)
            .flat_map(|n| {
                let s = (2.0 * std::f32::consts::PI * frequency * n as f32 / 44_100.0).sin() * 0.25;
                [s, s * 0.5]
            })
            .collect()
    }

    #[test]
    fn test_invalid_session_is_rejected() {
        let provider = SoftwareEffects::default();
        assert!(provider.create_equalizer(AudioSessionId::INVALID).is_err());
        assert!(provider.create_bass_boost(AudioSessionId(0)).is_err());
        assert!(provider.create_virtualizer(AudioSessionId(0)).is_err());
    }

    #[test]
    fn test_equalizer_reports_bands_and_presets() {
        let provider = SoftwareEffects::default();
        let eq = provider.create_equalizer(SESSION).unwrap();

        assert_eq!(eq.band_count(), 5);
        assert_eq!(eq.band_level_range(), (-1500, 1500));
        assert_eq!(eq.center_frequency(2).unwrap(), 910);
        assert!(eq.center_frequency(5).is_err());
        assert_eq!(eq.presets().len(), 10);
        assert_eq!(eq.presets()[3], "Flat");
    }

    #[test]
    fn test_equalizer_rejects_out_of_range_values() {
        let provider = SoftwareEffects::default();
        let mut eq = provider.create_equalizer(SESSION).unwrap();

        assert!(eq.set_band_level(0, 1501).is_err());
        assert!(eq.set_band_level(9, 0).is_err());
        assert!(eq.use_preset(10).is_err());
        assert!(eq.set_band_level(0, -1500).is_ok());
        assert_eq!(eq.band_level(0).unwrap(), -1500);
    }

    #[test]
    fn test_preset_loads_band_levels() {
        let provider = SoftwareEffects::default();
        let mut eq = provider.create_equalizer(SESSION).unwrap();

        eq.use_preset(9).unwrap();
        let levels: Vec<i16> = (0..5).map(|b| eq.band_level(b).unwrap()).collect();
        assert_eq!(levels, vec![500, 300, -100, 300, 500]);
    }

    #[test]
    fn test_processors_share_session_pipeline() {
        let provider = SoftwareEffects::default();
        let mut first = provider.create_bass_boost(SESSION).unwrap();
        let second = provider.create_bass_boost(SESSION).unwrap();
        let other = provider.create_bass_boost(AudioSessionId(8)).unwrap();

        first.set_strength(600).unwrap();
        assert_eq!(second.strength(), 600);
        assert_eq!(other.strength(), 0);
    }

    #[test]
    fn test_released_processor_is_inert() {
        let provider = SoftwareEffects::default();
        let mut virtualizer = provider.create_virtualizer(SESSION).unwrap();
        virtualizer.set_enabled(true);
        virtualizer.release();

        assert!(!virtualizer.is_enabled());
        assert!(virtualizer.set_strength(100).is_err());
        assert_eq!(virtualizer.strength(), 0);
        // Releasing twice is harmless
        virtualizer.release();
    }

    #[test]
    fn test_disabled_pipeline_passes_audio_through() {
        let provider = SoftwareEffects::default();
        let mut eq = provider.create_equalizer(SESSION).unwrap();
        eq.use_preset(5).unwrap();

        let original = stereo_sine(440.0, 512);
        let mut samples = original.clone();
        provider.process(SESSION, &mut samples);
        assert_eq!(samples, original);
    }

    #[test]
    fn test_enabled_effects_change_audio() {
        let provider = SoftwareEffects::default();
        let mut bass = provider.create_bass_boost(SESSION).unwrap();
        bass.set_enabled(true);
        bass.set_strength(1000).unwrap();

        let original = stereo_sine(60.0, 4096);
        let mut samples = original.clone();
        provider.process(SESSION, &mut samples);
        assert_ne!(samples, original);
    }

    #[test]
    fn test_virtualizer_widens_stereo_image() {
        let provider = SoftwareEffects::default();
        let mut virtualizer = provider.create_virtualizer(SESSION).unwrap();
        virtualizer.set_enabled(true);
        virtualizer.set_strength(1000).unwrap();

        let mut frame = [0.5_f32, 0.1];
        provider.process(SESSION, &mut frame);
        // mid 0.3, side 0.2 doubled to 0.4
        assert!((frame[0] - 0.7).abs() < 1e-6);
        assert!((frame[1] + 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_end_session_drops_pipeline() {
        let provider = SoftwareEffects::default();
        let mut bass = provider.create_bass_boost(SESSION).unwrap();
        bass.set_strength(300).unwrap();
        provider.end_session(SESSION);

        let fresh = provider.create_bass_boost(SESSION).unwrap();
        assert_eq!(fresh.strength(), 0);
    }

    #[test]
    fn test_unknown_session_passes_audio_through() {
        let provider = SoftwareEffects::default();
        let original = stereo_sine(440.0, 64);
        let mut samples = original.clone();
        provider.process(AudioSessionId(99), &mut samples);
        assert_eq!(samples, original);
    }
}
