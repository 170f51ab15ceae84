//! Construction-time configuration errors
//!
//! The pipeline refuses to run with an invalid configuration; processing
//! itself never fails (transient signal anomalies are absorbed, not raised).

use snafu::Snafu;

#[derive(Debug, Snafu, PartialEq)]
pub enum ConfigError {
    #[snafu(display("raw sample rate must be positive, got {rate} Hz"))]
    InvalidSampleRate { rate: f64 },

    #[snafu(display("decimation ratio must be at least 1"))]
    ZeroDecimation,

    #[snafu(display("lowpass cutoff {cutoff_hz} Hz is not realizable at {sample_rate} Hz"))]
    InvalidCutoff { cutoff_hz: f32, sample_rate: f64 },

    #[snafu(display("detection bandwidth must be positive, got {bandwidth_hz} Hz"))]
    InvalidBandwidth { bandwidth_hz: f32 },

    #[snafu(display("FFT size must be a power of two, got {size}"))]
    InvalidFftSize { size: usize },

    #[snafu(display("FFT hop must be in 1..={size}, got {hop}"))]
    InvalidFftHop { hop: usize, size: usize },

    #[snafu(display("target tone {tone_hz} Hz does not fit below Nyquist at {sample_rate} Hz"))]
    ToneAboveNyquist { tone_hz: f32, sample_rate: f64 },

    #[snafu(display("{name} must be positive, got {value}"))]
    InvalidMultiplier { name: &'static str, value: f32 },
}
