//! Baseband waveform synthesis
//!
//! Appends tone bursts and steady tones to an I/Q buffer. Burst edges get a
//! 1 ms cosine ramp; a hard-keyed edge splatters energy across the band.

use num::Complex;

/// Envelope ramp applied to both edges of a keyed burst.
const RAMP_MS: f64 = 1.0;

/// Incrementally builds a baseband I/Q stream at a fixed sample rate.
///
/// Phase is continuous across appended segments, so a tone interrupted by
/// silence resumes where the broadcast's oscillator would be.
pub struct SignalBuilder {
    sample_rate: f64,
    samples: Vec<Complex<f32>>,
}

impl SignalBuilder {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            samples: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_ms(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate * 1000.0
    }

    /// Append silence.
    pub fn silence(&mut self, duration_ms: f64) -> &mut Self {
        let n = self.count(duration_ms);
        self.samples
            .extend(std::iter::repeat(Complex::default()).take(n));
        self
    }

    /// Append a keyed tone burst (real cosine on I, ramped edges).
    pub fn burst(&mut self, freq_hz: f32, duration_ms: f64, amplitude: f32) -> &mut Self {
        use std::f32::consts::PI;
        let n = self.count(duration_ms);
        let ramp = (self.count(RAMP_MS)).min(n / 2).max(1);
        let start = self.samples.len();
        for k in 0..n {
            let t = (start + k) as f32 / self.sample_rate as f32;
            let envelope = if k < ramp {
                0.5 * (1.0 - (PI * k as f32 / ramp as f32).cos())
            } else if k >= n - ramp {
                0.5 * (1.0 - (PI * (n - 1 - k) as f32 / ramp as f32).cos())
            } else {
                1.0
            };
            let value = amplitude * envelope * (2.0 * PI * freq_hz * t).cos();
            self.samples.push(Complex::new(value, 0.0));
        }
        self
    }

    /// Mix a steady tone over the most recent `duration_ms` of the buffer
    /// (subcarriers and carrier ride under the keyed pulses). Real-valued,
    /// so it carries both sidebands like an AM-demodulated broadcast.
    pub fn mix_tone(&mut self, freq_hz: f32, duration_ms: f64, amplitude: f32) -> &mut Self {
        use std::f32::consts::PI;
        let n = self.count(duration_ms).min(self.samples.len());
        let start = self.samples.len() - n;
        for k in 0..n {
            let idx = start + k;
            let t = idx as f32 / self.sample_rate as f32;
            self.samples[idx].re += amplitude * (2.0 * PI * freq_hz * t).cos();
        }
        self
    }

    /// One broadcast second: a 5 ms tick then silence out to 1000 ms.
    pub fn tick_second(&mut self, tone_hz: f32, amplitude: f32) -> &mut Self {
        self.burst(tone_hz, 5.0, amplitude).silence(995.0)
    }

    /// One minute-boundary second: an 800 ms marker then 200 ms of silence.
    pub fn marker_second(&mut self, tone_hz: f32, amplitude: f32) -> &mut Self {
        self.burst(tone_hz, 800.0, amplitude).silence(200.0)
    }

    pub fn samples(&self) -> &[Complex<f32>] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<Complex<f32>> {
        self.samples
    }

    fn count(&self, duration_ms: f64) -> usize {
        (duration_ms / 1000.0 * self.sample_rate).round() as usize
    }
}
