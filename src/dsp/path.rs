//! Lowpass + decimation path
//!
//! One 2nd-order Butterworth lowpass section per channel (I and Q), then
//! integer-factor sample dropping. Two independently parameterized
//! instances feed the rest of the pipeline:
//! - detector path: 5 kHz cutoff, 40:1 → 50 kHz
//! - display path:  6 kHz cutoff, 166:1 → ~12 kHz
//!
//! Coefficients come from the standard bilinear-transform design at
//! construction and never change; `reset` clears filter history only.

use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type, Q_BUTTERWORTH_F32};
use num::Complex;

use crate::config::PathConfig;
use crate::error::ConfigError;

pub struct DecimatedPath {
    coeffs: Coefficients<f32>,
    lowpass_i: DirectForm2Transposed<f32>,
    lowpass_q: DirectForm2Transposed<f32>,
    ratio: u32,
    phase: u32,
    output_rate: f64,
}

impl DecimatedPath {
    pub fn new(input_rate: f64, config: PathConfig) -> Result<Self, ConfigError> {
        if config.ratio == 0 {
            return Err(ConfigError::ZeroDecimation);
        }
        let coeffs = Coefficients::<f32>::from_params(
            Type::LowPass,
            (input_rate as f32).hz(),
            config.cutoff_hz.hz(),
            Q_BUTTERWORTH_F32,
        )
        .map_err(|_| ConfigError::InvalidCutoff {
            cutoff_hz: config.cutoff_hz,
            sample_rate: input_rate,
        })?;

        Ok(Self {
            coeffs,
            lowpass_i: DirectForm2Transposed::<f32>::new(coeffs),
            lowpass_q: DirectForm2Transposed::<f32>::new(coeffs),
            ratio: config.ratio,
            phase: 0,
            output_rate: config.output_rate(input_rate),
        })
    }

    /// Filter one raw sample; emits a decimated sample once per `ratio` inputs.
    #[inline]
    pub fn push(&mut self, sample: Complex<f32>) -> Option<Complex<f32>> {
        let i = self.lowpass_i.run(sample.re);
        let q = self.lowpass_q.run(sample.im);
        self.phase += 1;
        if self.phase >= self.ratio {
            self.phase = 0;
            Some(Complex::new(i, q))
        } else {
            None
        }
    }

    pub fn output_rate(&self) -> f64 {
        self.output_rate
    }

    /// Clear filter history and decimation phase; coefficients are kept.
    pub fn reset(&mut self) {
        self.lowpass_i = DirectForm2Transposed::<f32>::new(self.coeffs);
        self.lowpass_q = DirectForm2Transposed::<f32>::new(self.coeffs);
        self.phase = 0;
    }
}
