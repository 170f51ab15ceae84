//! Windowed FFT frames and narrowband bucket energy
//!
//! Every detector sizes its own FFT for its target signal and keeps its own
//! sample buffer: detectors never share spectra even when they consume the
//! same stream. That duplication is deliberate: it keeps each detector's
//! scaling self-consistent and testable in isolation.
//!
//! **Bucket energy**: sum of spectral magnitudes over a run of bins
//! centered on the target frequency, plus the mirrored negative-frequency
//! bins, each normalized by FFT size.

use std::sync::Arc;

use num::Complex;
use rustfft::{Fft, FftPlanner};

use crate::error::ConfigError;

/// Window shape for a spectral frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    Hann,
    /// 4-term Blackman-Harris, for the tone trackers' low sidelobes
    BlackmanHarris,
}

fn make_window(kind: Window, size: usize) -> Vec<f32> {
    use std::f32::consts::PI;
    (0..size)
        .map(|i| {
            let n = i as f32 / (size - 1) as f32;
            match kind {
                Window::Hann => 0.5 * (1.0 - (2.0 * PI * n).cos()),
                Window::BlackmanHarris => {
                    0.35875 - 0.48829 * (2.0 * PI * n).cos() + 0.14128 * (4.0 * PI * n).cos()
                        - 0.01168 * (6.0 * PI * n).cos()
                }
            }
        })
        .collect()
}

/// Fixed-size windowed FFT over a ring of complex samples.
///
/// Samples are pushed one at a time; every `hop` samples (once the ring is
/// primed) the spectrum is recomputed. `hop == size` gives back-to-back
/// blocks; `hop == size / 2` gives 50% overlap.
pub struct WindowedFft {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    ring: Vec<Complex<f32>>,
    pos: usize,
    primed: bool,
    since_frame: usize,
    hop: usize,
    size: usize,
    spectrum: Vec<Complex<f32>>,
}

impl WindowedFft {
    pub fn new(size: usize, hop: usize, kind: Window) -> Result<Self, ConfigError> {
        if size == 0 || !size.is_power_of_two() {
            return Err(ConfigError::InvalidFftSize { size });
        }
        if hop == 0 || hop > size {
            return Err(ConfigError::InvalidFftHop { hop, size });
        }
        let mut planner = FftPlanner::new();
        Ok(Self {
            fft: planner.plan_fft_forward(size),
            window: make_window(kind, size),
            ring: vec![Complex::default(); size],
            pos: 0,
            primed: false,
            since_frame: 0,
            hop,
            size,
            spectrum: vec![Complex::default(); size],
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Push one sample. Returns `true` when a fresh spectrum is available.
    pub fn push(&mut self, sample: Complex<f32>) -> bool {
        self.ring[self.pos] = sample;
        self.pos = (self.pos + 1) % self.size;
        if !self.primed {
            if self.pos == 0 {
                self.primed = true;
                self.since_frame = self.hop; // fire on the first full buffer
            } else {
                return false;
            }
        } else {
            self.since_frame += 1;
        }
        if self.since_frame < self.hop {
            return false;
        }
        self.since_frame = 0;

        // Window oldest-to-newest into the work buffer, then transform in place.
        for k in 0..self.size {
            let idx = (self.pos + k) % self.size;
            self.spectrum[k] = self.ring[idx] * self.window[k];
        }
        self.fft.process(&mut self.spectrum);
        true
    }

    /// Spectrum of the most recent frame (bins 0..size, negative
    /// frequencies in the upper half).
    pub fn spectrum(&self) -> &[Complex<f32>] {
        &self.spectrum
    }

    /// Size-normalized magnitude of one bin; out-of-range bins read as zero.
    pub fn magnitude(&self, bin: i64) -> f32 {
        if bin < 0 || bin >= self.size as i64 {
            return 0.0;
        }
        self.spectrum[bin as usize].norm() / self.size as f32
    }

    pub fn reset(&mut self) {
        self.ring.fill(Complex::default());
        self.spectrum.fill(Complex::default());
        self.pos = 0;
        self.primed = false;
        self.since_frame = 0;
    }
}

/// Bucket-energy extractor: a `WindowedFft` plus the bin arithmetic for one
/// target tone.
pub struct EnergyExtractor {
    fft: WindowedFft,
    center_bin: i64,
    bin_span: i64,
}

impl EnergyExtractor {
    pub fn new(
        sample_rate: f64,
        fft_size: usize,
        target_hz: f32,
        bandwidth_hz: f32,
    ) -> Result<Self, ConfigError> {
        if !(bandwidth_hz > 0.0) {
            return Err(ConfigError::InvalidBandwidth { bandwidth_hz });
        }
        if f64::from(target_hz) >= sample_rate / 2.0 {
            return Err(ConfigError::ToneAboveNyquist {
                tone_hz: target_hz,
                sample_rate,
            });
        }
        let hz_per_bin = sample_rate as f32 / fft_size as f32;
        let bin_span = ((bandwidth_hz / hz_per_bin).round() as i64).max(1);
        Ok(Self {
            fft: WindowedFft::new(fft_size, fft_size, Window::Hann)?,
            center_bin: (target_hz / hz_per_bin).round() as i64,
            bin_span,
        })
    }

    /// Push one sample; yields the frame's bucket energy when a block completes.
    pub fn push(&mut self, sample: Complex<f32>) -> Option<f32> {
        if !self.fft.push(sample) {
            return None;
        }
        Some(self.bucket_energy())
    }

    fn bucket_energy(&self) -> f32 {
        let size = self.fft.size() as i64;
        let mut energy = 0.0f32;
        for b in -self.bin_span..=self.bin_span {
            energy += self.fft.magnitude(self.center_bin + b);
            energy += self.fft.magnitude(size - self.center_bin + b);
        }
        energy
    }

    pub fn reset(&mut self) {
        self.fft.reset();
    }
}
