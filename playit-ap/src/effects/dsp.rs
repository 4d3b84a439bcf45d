//! Biquad filters for the software effects
//!
//! Coefficients follow the RBJ audio EQ cookbook. Filters run in direct form I
//! with one delay line per channel so interleaved frames can be processed in
//! place.

use std::f64::consts::PI;

/// Normalized biquad coefficients (a0 folded in)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoefficients {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadCoefficients {
    /// Pass-through filter
    pub const IDENTITY: BiquadCoefficients = BiquadCoefficients {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    fn normalized(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Peaking EQ centered on `frequency` with `gain_db` boost or cut
    pub fn peaking(sample_rate: f64, frequency: f64, q: f64, gain_db: f64) -> Self {
        if gain_db == 0.0 {
            return Self::IDENTITY;
        }

        let a = 10.0_f64.powf(gain_db / 40.0);
        let omega = 2.0 * PI * frequency / sample_rate;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / (2.0 * q);

        Self::normalized(
            1.0 + alpha * a,
            -2.0 * cos_omega,
            1.0 - alpha * a,
            1.0 + alpha / a,
            -2.0 * cos_omega,
            1.0 - alpha / a,
        )
    }

    /// Low shelf below `frequency` with `gain_db` boost or cut
    pub fn low_shelf(sample_rate: f64, frequency: f64, q: f64, gain_db: f64) -> Self {
        if gain_db == 0.0 {
            return Self::IDENTITY;
        }

        let a = 10.0_f64.powf(gain_db / 40.0);
        let omega = 2.0 * PI * frequency / sample_rate;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / (2.0 * q);
        let sqrt_2a = 2.0 * a.sqrt();

        Self::normalized(
            a * ((a + 1.0) - (a - 1.0) * cos_omega + sqrt_2a * alpha),
            2.0 * a * ((a - 1.0) - (a + 1.0) * cos_omega),
            a * ((a + 1.0) - (a - 1.0) * cos_omega - sqrt_2a * alpha),
            (a + 1.0) + (a - 1.0) * cos_omega + sqrt_2a * alpha,
            -2.0 * ((a - 1.0) + (a + 1.0) * cos_omega),
            (a + 1.0) + (a - 1.0) * cos_omega - sqrt_2a * alpha,
        )
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct DelayLine {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

/// Biquad filter with per-channel state
#[derive(Debug, Clone)]
pub struct Biquad {
    coefficients: BiquadCoefficients,
    state: Vec<DelayLine>,
}

impl Biquad {
    pub fn new(coefficients: BiquadCoefficients, channels: usize) -> Self {
        Self {
            coefficients,
            state: vec![DelayLine::default(); channels.max(1)],
        }
    }

    /// Swap coefficients, keeping the delay lines so parameter changes don't click
    pub fn set_coefficients(&mut self, coefficients: BiquadCoefficients) {
        self.coefficients = coefficients;
    }

    pub fn coefficients(&self) -> BiquadCoefficients {
        self.coefficients
    }

    pub fn channels(&self) -> usize {
        self.state.len()
    }

    pub fn reset(&mut self) {
        self.state.fill(DelayLine::default());
    }

    /// Filter one sample of `channel`
    pub fn process_sample(&mut self, channel: usize, input: f64) -> f64 {
        let c = self.coefficients;
        let line = &mut self.state[channel];

        let output = c.b0 * input + c.b1 * line.x1 + c.b2 * line.x2 - c.a1 * line.y1 - c.a2 * line.y2;

        line.x2 = line.x1;
        line.x1 = input;
        line.y2 = line.y1;
        line.y1 = output;

        output
    }

    /// Filter interleaved frames in place
    pub fn process_interleaved(&mut self, samples: &mut [f32]) {
        if self.coefficients.is_identity() {
            return;
        }

        let channels = self.state.len();
        for frame in samples.chunks_mut(channels) {
            for (channel, sample) in frame.iter_mut().enumerate() {
                *sample = self.process_sample(channel, *sample as f64) as f32;
            }
        }
    }
}
