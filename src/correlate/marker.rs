//! Fast/slow marker fusion
//!
//! Two structurally different detectors watch the same minute pulse: the
//! fast-path accumulator (50 kHz, coarse bins, sharp timing) and the
//! slow-path corroborator (12 kHz, fine bins, sluggish timing). This stage
//! holds each fast candidate open for one fusion window and grades the
//! agreement:
//!
//! - HIGH: fast duration criterion met AND a slow frame went above
//!   threshold inside the window
//! - LOW:  exactly one of the two held
//! - NONE: neither
//!
//! Pure annotation: the verdict augments reporting and never gates the
//! sync detector.

use tracing::info;

use crate::event::{CorrelatedMarker, MarkerConfidence, SlowMarkerFrame};

pub struct MarkerCorrelator {
    window_ms: f64,
    min_duration_ms: f64,

    fast_pending: Option<FastCandidate>,
    slow_triggered: bool,
    slow_peak_energy: f32,
    slow_peak_snr: f32,

    seq: u64,
    high_count: u64,
    low_count: u64,
    last_verdict: Option<MarkerConfidence>,
}

#[derive(Debug, Clone, Copy)]
struct FastCandidate {
    timestamp_ms: f64,
    duration_ms: f64,
}

impl MarkerCorrelator {
    pub fn new(window_ms: f64, min_duration_ms: f64) -> Self {
        Self {
            window_ms,
            min_duration_ms,
            fast_pending: None,
            slow_triggered: false,
            slow_peak_energy: 0.0,
            slow_peak_snr: 0.0,
            seq: 0,
            high_count: 0,
            low_count: 0,
            last_verdict: None,
        }
    }

    /// Anchor a new fusion window on a fast-path candidate.
    pub fn fast_event(&mut self, timestamp_ms: f64, duration_ms: f64) {
        self.fast_pending = Some(FastCandidate {
            timestamp_ms,
            duration_ms,
        });
        self.slow_triggered = false;
        self.slow_peak_energy = 0.0;
        self.slow_peak_snr = 0.0;
    }

    /// Feed one slow-path frame; emits the fused verdict when the window
    /// anchored by the last fast candidate expires.
    ///
    /// A frame that lands past the window closes the verdict *without*
    /// contributing its own trigger state to it.
    pub fn slow_frame(&mut self, frame: &SlowMarkerFrame) -> Option<CorrelatedMarker> {
        let verdict = match self.fast_pending {
            Some(fast) if frame.timestamp_ms - fast.timestamp_ms > self.window_ms => {
                self.fast_pending = None;
                Some(self.finalize(fast))
            }
            _ => None,
        };

        if self.fast_pending.is_some() && frame.above_threshold {
            self.slow_triggered = true;
            if frame.energy > self.slow_peak_energy {
                self.slow_peak_energy = frame.energy;
                self.slow_peak_snr = frame.snr_db;
            }
        }

        verdict
    }

    fn finalize(&mut self, fast: FastCandidate) -> CorrelatedMarker {
        let fast_ok = fast.duration_ms >= self.min_duration_ms;
        let confidence = match (fast_ok, self.slow_triggered) {
            (true, true) => MarkerConfidence::High,
            (false, false) => MarkerConfidence::None,
            _ => MarkerConfidence::Low,
        };
        match confidence {
            MarkerConfidence::High => self.high_count += 1,
            MarkerConfidence::Low => self.low_count += 1,
            MarkerConfidence::None => {}
        }
        self.seq += 1;
        self.last_verdict = Some(confidence);
        info!(
            seq = self.seq,
            duration_ms = fast.duration_ms,
            slow_energy = self.slow_peak_energy,
            ?confidence,
            "marker fusion verdict"
        );
        CorrelatedMarker {
            seq: self.seq,
            timestamp_ms: fast.timestamp_ms,
            duration_ms: fast.duration_ms,
            slow_energy: self.slow_peak_energy,
            slow_snr_db: self.slow_peak_snr,
            confidence,
        }
    }

    pub fn confirmed_count(&self) -> u64 {
        self.high_count
    }

    pub fn single_path_count(&self) -> u64 {
        self.low_count
    }

    /// Confidence of the most recently completed verdict window.
    pub fn last_confidence(&self) -> Option<MarkerConfidence> {
        self.last_verdict
    }

    pub fn reset(&mut self) {
        self.fast_pending = None;
        self.slow_triggered = false;
        self.slow_peak_energy = 0.0;
        self.slow_peak_snr = 0.0;
        self.seq = 0;
        self.high_count = 0;
        self.low_count = 0;
        self.last_verdict = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slow(timestamp_ms: f64, above: bool) -> SlowMarkerFrame {
        SlowMarkerFrame {
            seq: 0,
            timestamp_ms,
            energy: if above { 5.0 } else { 0.2 },
            snr_db: if above { 12.0 } else { -3.0 },
            noise_floor: 0.1,
            above_threshold: above,
        }
    }

    #[test]
    fn fast_alone_is_low_confidence() {
        let mut mc = MarkerCorrelator::new(500.0, 500.0);
        mc.fast_event(10_000.0, 600.0);
        // Slow frames inside the window never trigger.
        assert!(mc.slow_frame(&slow(10_100.0, false)).is_none());
        assert!(mc.slow_frame(&slow(10_300.0, false)).is_none());
        // First frame past the window closes the verdict.
        let verdict = mc.slow_frame(&slow(10_600.0, false)).unwrap();
        assert_eq!(verdict.confidence, MarkerConfidence::Low);
        assert_eq!(verdict.timestamp_ms, 10_000.0);
    }

    #[test]
    fn fast_plus_slow_is_high_confidence() {
        let mut mc = MarkerCorrelator::new(500.0, 500.0);
        mc.fast_event(10_000.0, 600.0);
        assert!(mc.slow_frame(&slow(10_200.0, true)).is_none());
        let verdict = mc.slow_frame(&slow(10_600.0, false)).unwrap();
        assert_eq!(verdict.confidence, MarkerConfidence::High);
        assert_eq!(verdict.slow_energy, 5.0);
        assert_eq!(verdict.slow_snr_db, 12.0);
        assert_eq!(mc.confirmed_count(), 1);
    }

    #[test]
    fn short_fast_with_slow_is_low() {
        let mut mc = MarkerCorrelator::new(500.0, 500.0);
        mc.fast_event(10_000.0, 300.0);
        mc.slow_frame(&slow(10_200.0, true));
        let verdict = mc.slow_frame(&slow(10_600.0, false)).unwrap();
        assert_eq!(verdict.confidence, MarkerConfidence::Low);
    }

    #[test]
    fn neither_criterion_is_none() {
        let mut mc = MarkerCorrelator::new(500.0, 500.0);
        mc.fast_event(10_000.0, 300.0);
        let verdict = mc.slow_frame(&slow(10_600.0, false)).unwrap();
        assert_eq!(verdict.confidence, MarkerConfidence::None);
        assert_eq!(mc.confirmed_count(), 0);
        assert_eq!(mc.single_path_count(), 0);
    }

    #[test]
    fn slow_trigger_outside_window_does_not_upgrade() {
        let mut mc = MarkerCorrelator::new(500.0, 500.0);
        mc.fast_event(10_000.0, 600.0);
        // The closing frame is itself above threshold, but it arrives past
        // the window and must not count toward this verdict.
        let verdict = mc.slow_frame(&slow(10_600.0, true)).unwrap();
        assert_eq!(verdict.confidence, MarkerConfidence::Low);
    }
}
