//! Channel noise injection
//!
//! Gaussian noise on both I and Q, scaled either directly by sigma or to a
//! target SNR against a measured signal power.

use num::Complex;
use rand::prelude::*;
use rand_distr::{Distribution, Normal};

/// RMS power of a complex signal.
pub fn rms_power(samples: &[Complex<f32>]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s.norm_sqr()).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Add white Gaussian noise with the given per-channel sigma.
pub fn add_noise(samples: &mut [Complex<f32>], sigma: f32, rng: &mut impl Rng) {
    if sigma <= 0.0 {
        return;
    }
    let normal = Normal::new(0.0f32, sigma).expect("sigma checked positive");
    for s in samples.iter_mut() {
        s.re += normal.sample(rng);
        s.im += normal.sample(rng);
    }
}

/// Add noise scaled so the buffer's current RMS power sits `snr_db` above
/// the injected noise power.
pub fn add_noise_for_snr(samples: &mut [Complex<f32>], snr_db: f32, rng: &mut impl Rng) {
    let signal_rms = rms_power(samples);
    if signal_rms <= 0.0 {
        return;
    }
    let noise_rms = signal_rms / 10.0f32.powf(snr_db / 20.0);
    // Per-channel sigma: total complex noise power splits across I and Q.
    add_noise(samples, noise_rms / 2.0f32.sqrt(), rng);
}
