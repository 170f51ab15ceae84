//! Front-end DSP: decimation paths and windowed-FFT energy extraction
//!
//! **Module Organization**:
//! - `path` - per-path Butterworth lowpass + integer decimation
//! - `spectrum` - windowed FFT frames and narrowband bucket energy

pub mod path;
pub mod spectrum;

pub use path::DecimatedPath;
pub use spectrum::{EnergyExtractor, WindowedFft};
