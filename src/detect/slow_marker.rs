//! Slow-path marker corroborator
//!
//! Runs on the display stream with a 2048-point FFT (≈5.9 Hz/bin at
//! ~12 kHz) and 50% frame overlap, trading time resolution for frequency
//! selectivity. A 10-frame sliding sum (~850 ms, matched to the marker
//! pulse) is compared against noise measured from two bands *adjacent* to
//! the target bucket rather than from an idle-period history, immune to
//! the pulse raising its own reference.
//!
//! This detector never declares a marker. It emits one frame record per
//! accumulation step; only the marker correlator gives those frames meaning.

use num::Complex;

use crate::config::SlowMarkerConfig;
use crate::dsp::spectrum::{Window, WindowedFft};
use crate::error::ConfigError;
use crate::event::SlowMarkerFrame;

pub struct SlowMarkerDetector {
    config: SlowMarkerConfig,
    fft: WindowedFft,
    center_bin: i64,
    bin_span: i64,
    frame_ms: f64,

    energy_history: Vec<f32>,
    history_idx: usize,
    history_count: usize,
    accumulated: f32,

    noise_floor: f32,
    above_threshold: bool,
    frame_count: u64,
    seq: u64,
}

impl SlowMarkerDetector {
    pub fn new(
        sample_rate: f64,
        target_hz: f32,
        config: SlowMarkerConfig,
    ) -> Result<Self, ConfigError> {
        if !(config.bandwidth_hz > 0.0) {
            return Err(ConfigError::InvalidBandwidth {
                bandwidth_hz: config.bandwidth_hz,
            });
        }
        if f64::from(target_hz) >= sample_rate / 2.0 {
            return Err(ConfigError::ToneAboveNyquist {
                tone_hz: target_hz,
                sample_rate,
            });
        }
        let hop = config.fft_size / 2;
        let fft = WindowedFft::new(config.fft_size, hop, Window::Hann)?;
        let hz_per_bin = sample_rate as f32 / config.fft_size as f32;
        Ok(Self {
            fft,
            center_bin: (target_hz / hz_per_bin).round() as i64,
            bin_span: ((config.bandwidth_hz / 2.0 / hz_per_bin).round() as i64).max(1),
            frame_ms: hop as f64 * 1000.0 / sample_rate,
            energy_history: vec![0.0; config.accum_frames],
            history_idx: 0,
            history_count: 0,
            accumulated: 0.0,
            noise_floor: 0.01,
            above_threshold: false,
            frame_count: 0,
            seq: 0,
            config,
        })
    }

    pub fn frame_duration_ms(&self) -> f64 {
        self.frame_ms
    }

    pub fn noise_floor(&self) -> f32 {
        self.noise_floor
    }

    pub fn reset(&mut self) {
        self.fft.reset();
        self.energy_history.fill(0.0);
        self.history_idx = 0;
        self.history_count = 0;
        self.accumulated = 0.0;
        self.noise_floor = 0.01;
        self.above_threshold = false;
        self.frame_count = 0;
        self.seq = 0;
    }

    /// Process one display-path sample; yields a frame record per hop.
    pub fn process(&mut self, sample: Complex<f32>) -> Option<SlowMarkerFrame> {
        if !self.fft.push(sample) {
            return None;
        }
        let frame = self.measure();
        self.frame_count += 1;
        Some(frame)
    }

    fn measure(&mut self) -> SlowMarkerFrame {
        let half = self.fft.size() as i64 / 2;

        // Signal bucket: positive-frequency bins around the target tone.
        let mut signal = 0.0f32;
        for b in -self.bin_span..=self.bin_span {
            let bin = self.center_bin + b;
            if bin >= 0 && bin < half {
                signal += self.fft.magnitude(bin);
            }
        }

        // Noise reference: one bucket-width band on each side of the signal
        // bucket, summed over the same span so the comparison is
        // like-for-like with the signal sum.
        let mut noise = 0.0f32;
        let mut bands = 0u32;
        for band_center in [
            self.center_bin - 3 * self.bin_span,
            self.center_bin + 3 * self.bin_span,
        ] {
            let mut band = 0.0f32;
            let mut hit = false;
            for b in -self.bin_span..=self.bin_span {
                let bin = band_center + b;
                if bin >= 0 && bin < half {
                    band += self.fft.magnitude(bin);
                    hit = true;
                }
            }
            if hit {
                noise += band;
                bands += 1;
            }
        }
        let frame_noise = if bands > 0 { noise / bands as f32 } else { 1e-3 };

        // Adapt the reference only while not detecting.
        if !self.above_threshold {
            self.noise_floor += self.config.noise_adapt_rate * (frame_noise - self.noise_floor);
            self.noise_floor = self.noise_floor.max(1e-4);
        }

        let window = self.energy_history.len();
        if self.history_count >= window {
            self.accumulated -= self.energy_history[self.history_idx];
        }
        self.energy_history[self.history_idx] = signal;
        self.accumulated += signal;
        self.history_idx = (self.history_idx + 1) % window;
        if self.history_count < window {
            self.history_count += 1;
        }

        let noise_sum = self.noise_floor * window as f32;
        let threshold = noise_sum * self.config.threshold_mult;
        self.above_threshold = self.accumulated > threshold;
        let snr_db = if noise_sum > 1e-4 {
            20.0 * (self.accumulated / noise_sum).log10()
        } else {
            0.0
        };

        self.seq += 1;
        SlowMarkerFrame {
            seq: self.seq,
            timestamp_ms: self.frame_count as f64 * self.frame_ms,
            energy: self.accumulated,
            snr_db,
            noise_floor: self.noise_floor,
            above_threshold: self.above_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    const RATE: f64 = 2_000_000.0 / 166.0;
    const TONE: f32 = 1000.0;

    fn run(detector: &mut SlowMarkerDetector, start_idx: &mut u64, ms: f64, amp: f32) -> Vec<SlowMarkerFrame> {
        let n = (ms / 1000.0 * RATE) as u64;
        let mut frames = Vec::new();
        for _ in 0..n {
            let t = *start_idx as f32 / RATE as f32;
            let x = (*start_idx)
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1)
                >> 33;
            let dither = 0.02 * ((x as u32 as f32 / u32::MAX as f32) - 0.5);
            let s = Complex::new(amp * (2.0 * PI * TONE * t).cos() + dither, 0.0);
            *start_idx += 1;
            if let Some(f) = detector.process(s) {
                frames.push(f);
            }
        }
        frames
    }

    #[test]
    fn frames_arrive_at_hop_cadence() {
        let mut d = SlowMarkerDetector::new(RATE, TONE, SlowMarkerConfig::default()).unwrap();
        let mut idx = 0;
        let frames = run(&mut d, &mut idx, 2000.0, 0.0);
        // 2 s at ~85 ms per hop, minus the initial buffer fill.
        assert!(
            (20..=23).contains(&frames.len()),
            "unexpected frame count {}",
            frames.len()
        );
        for pair in frames.windows(2) {
            assert_eq!(pair[1].seq, pair[0].seq + 1);
            assert!(pair[1].timestamp_ms > pair[0].timestamp_ms);
        }
    }

    #[test]
    fn marker_pulse_raises_above_threshold() {
        let mut d = SlowMarkerDetector::new(RATE, TONE, SlowMarkerConfig::default()).unwrap();
        let mut idx = 0;
        let quiet = run(&mut d, &mut idx, 4000.0, 0.0);
        assert!(
            quiet.iter().all(|f| !f.above_threshold),
            "quiet frames must stay below threshold"
        );

        let loud = run(&mut d, &mut idx, 850.0, 1.0);
        let tail = run(&mut d, &mut idx, 500.0, 0.0);
        assert!(
            loud.iter().chain(tail.iter()).any(|f| f.above_threshold),
            "850 ms pulse should push the accumulator above threshold"
        );
        let best = loud
            .iter()
            .chain(tail.iter())
            .map(|f| f.snr_db)
            .fold(f32::MIN, f32::max);
        assert!(best > 6.0, "peak SNR {} dB too low", best);
    }

    #[test]
    fn noise_reference_ignores_the_tone_itself() {
        // A sustained tone must not inflate the adjacent-band noise floor.
        let mut d = SlowMarkerDetector::new(RATE, TONE, SlowMarkerConfig::default()).unwrap();
        let mut idx = 0;
        run(&mut d, &mut idx, 3000.0, 0.0);
        let floor_before = d.noise_floor();
        run(&mut d, &mut idx, 3000.0, 0.5);
        let floor_after = d.noise_floor();
        assert!(
            floor_after < floor_before * 5.0,
            "floor jumped {} -> {}",
            floor_before,
            floor_after
        );
    }
}
