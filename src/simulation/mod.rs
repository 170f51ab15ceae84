//! Synthetic signal generation for tests and demos
//!
//! Builds baseband I/Q streams shaped like the broadcast: second ticks,
//! minute markers, reference subcarriers, and Gaussian channel noise at a
//! chosen SNR.
//!
//! **Module Organization**:
//! - `waveform` - tone bursts, tick/marker placement, envelope shaping
//! - `noise` - Gaussian noise injection and power helpers

pub mod noise;
pub mod waveform;

pub use noise::{add_noise, add_noise_for_snr, rms_power};
pub use waveform::SignalBuilder;
