//! Signal detectors
//!
//! Each detector is self-contained: it owns its FFT (sized for its target
//! signal), its sample buffer, and its detection state machine. Detectors
//! run in parallel on the same decimated stream without sharing state.
//!
//! **Module Organization**:
//! - `tick` - per-second 5 ms pulse detector (detector path, 50 kHz)
//! - `marker` - per-minute 800 ms pulse detector (detector path)
//! - `slow_marker` - fine-resolution minute-pulse corroborator (display path)
//! - `tone` - carrier/subcarrier frequency and PPM trackers (display path)

pub mod marker;
pub mod slow_marker;
pub mod tick;
pub mod tone;

pub use marker::MarkerDetector;
pub use slow_marker::SlowMarkerDetector;
pub use tick::{TickDetector, TickOutput};
pub use tone::{ToneMeasurement, ToneTracker};
