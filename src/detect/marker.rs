//! Minute-marker detector (fast path)
//!
//! Integrates target-tone bucket energy over a sliding ~1 second window and
//! triggers when the accumulated sum exceeds 3x its self-tracked baseline.
//! The baseline follows the *accumulator* (not the per-frame energy) with a
//! slow exponential update and only adapts while IDLE.
//!
//! A wider detection bucket than the tick detector's: the 800 ms pulse
//! occupies more spectrum than the 5 ms tick.
//!
//! IDLE → IN_MARKER → (emit if 500-5000 ms, else discard) → COOLDOWN (30 s).
//! An accumulator stuck above threshold past the duration ceiling forces a
//! rebaseline to the current accumulator value.

use num::Complex;
use tracing::{debug, info, warn};

use crate::config::MarkerConfig;
use crate::dsp::EnergyExtractor;
use crate::error::ConfigError;
use crate::event::{MinutePulseEvent, MinutePulseSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerState {
    Idle,
    InMarker,
    Cooldown,
}

pub struct MarkerDetector {
    config: MarkerConfig,
    extractor: EnergyExtractor,
    frame_ms: f64,

    // Sliding accumulator
    energy_history: Vec<f32>,
    history_idx: usize,
    history_count: usize,
    accumulated: f32,
    baseline: f32,
    threshold: f32,

    // Detection state
    state: MarkerState,
    marker_start_ms: f64,
    marker_peak: f32,
    marker_frames: u32,
    cooldown_frames: u32,
    warmup_complete: bool,

    frame_count: u64,
    seq: u64,
    last_marker_start_ms: Option<f64>,
}

impl MarkerDetector {
    pub fn new(
        sample_rate: f64,
        target_hz: f32,
        config: MarkerConfig,
    ) -> Result<Self, ConfigError> {
        let extractor =
            EnergyExtractor::new(sample_rate, config.fft_size, target_hz, config.bandwidth_hz)?;
        let frame_ms = config.fft_size as f64 * 1000.0 / sample_rate;
        let window_frames = ((config.window_ms / frame_ms).round() as usize).max(1);
        let baseline = 0.01f32;
        Ok(Self {
            extractor,
            frame_ms,
            energy_history: vec![0.0; window_frames],
            history_idx: 0,
            history_count: 0,
            accumulated: 0.0,
            baseline,
            threshold: baseline * config.threshold_mult,
            state: MarkerState::Idle,
            marker_start_ms: 0.0,
            marker_peak: 0.0,
            marker_frames: 0,
            cooldown_frames: 0,
            warmup_complete: false,
            frame_count: 0,
            seq: 0,
            last_marker_start_ms: None,
            config,
        })
    }

    /// Process one detector-path sample. At most one event per completed frame.
    pub fn process(&mut self, sample: Complex<f32>) -> Option<MinutePulseEvent> {
        let energy = self.extractor.push(sample)?;
        let event = self.advance(energy);
        self.frame_count += 1;
        event
    }

    pub fn frame_duration_ms(&self) -> f64 {
        self.frame_ms
    }

    pub fn accumulated_energy(&self) -> f32 {
        self.accumulated
    }

    pub fn baseline(&self) -> f32 {
        self.baseline
    }

    pub fn reset(&mut self) {
        self.extractor.reset();
        self.energy_history.fill(0.0);
        self.history_idx = 0;
        self.history_count = 0;
        self.accumulated = 0.0;
        self.baseline = 0.01;
        self.threshold = self.baseline * self.config.threshold_mult;
        self.state = MarkerState::Idle;
        self.marker_frames = 0;
        self.cooldown_frames = 0;
        self.warmup_complete = false;
        self.frame_count = 0;
        self.seq = 0;
        self.last_marker_start_ms = None;
    }

    fn push_accumulator(&mut self, energy: f32) {
        let window = self.energy_history.len();
        if self.history_count >= window {
            self.accumulated -= self.energy_history[self.history_idx];
        }
        self.energy_history[self.history_idx] = energy;
        self.accumulated += energy;
        self.history_idx = (self.history_idx + 1) % window;
        if self.history_count < window {
            self.history_count += 1;
        }
    }

    fn advance(&mut self, energy: f32) -> Option<MinutePulseEvent> {
        let now_ms = self.frame_count as f64 * self.frame_ms;
        self.push_accumulator(energy);

        if !self.warmup_complete {
            self.baseline +=
                self.config.warmup_adapt_rate * (self.accumulated - self.baseline);
            self.threshold = self.baseline * self.config.threshold_mult;
            if self.frame_count >= self.config.warmup_frames {
                self.warmup_complete = true;
                info!(
                    baseline = self.baseline,
                    threshold = self.threshold,
                    "marker detector warmup complete"
                );
            }
            return None;
        }

        // Baseline still settling: track, but declare nothing yet.
        if now_ms < self.config.startup_holdoff_ms {
            self.baseline +=
                self.config.baseline_adapt_rate * (self.accumulated - self.baseline);
            self.threshold = self.baseline * self.config.threshold_mult;
            return None;
        }

        if self.state == MarkerState::Idle {
            self.baseline +=
                self.config.baseline_adapt_rate * (self.accumulated - self.baseline);
            self.baseline = self.baseline.max(1e-3);
            self.threshold = self.baseline * self.config.threshold_mult;
        }

        match self.state {
            MarkerState::Idle => {
                if self.accumulated > self.threshold {
                    self.state = MarkerState::InMarker;
                    self.marker_start_ms = now_ms;
                    self.marker_peak = self.accumulated;
                    self.marker_frames = 1;
                }
                None
            }
            MarkerState::InMarker => {
                self.marker_frames += 1;
                if self.accumulated > self.marker_peak {
                    self.marker_peak = self.accumulated;
                }
                let duration_ms = self.marker_frames as f64 * self.frame_ms;
                let timed_out = duration_ms > self.config.max_duration_ms;

                if self.accumulated < self.threshold || timed_out {
                    let event = if duration_ms >= self.config.min_duration_ms && !timed_out {
                        self.seq += 1;
                        let interval_ms = self
                            .last_marker_start_ms
                            .map(|t| self.marker_start_ms - t)
                            .unwrap_or(0.0);
                        self.last_marker_start_ms = Some(self.marker_start_ms);
                        info!(
                            seq = self.seq,
                            duration_ms,
                            accumulated = self.marker_peak,
                            "minute marker (accumulator path)"
                        );
                        Some(MinutePulseEvent {
                            seq: self.seq,
                            source: MinutePulseSource::Accumulator,
                            timestamp_ms: now_ms,
                            duration_ms,
                            interval_ms,
                            metric: self.marker_peak,
                        })
                    } else {
                        if timed_out {
                            // Accumulator stuck high: the baseline is wrong, adopt the new level.
                            warn!(duration_ms, "marker timeout, rebaselining");
                            self.baseline = self.accumulated;
                            self.threshold = self.baseline * self.config.threshold_mult;
                        } else {
                            debug!(duration_ms, "marker candidate too short, discarded");
                        }
                        None
                    };
                    self.state = MarkerState::Cooldown;
                    self.cooldown_frames =
                        (self.config.cooldown_ms / self.frame_ms).round() as u32;
                    event
                } else {
                    None
                }
            }
            MarkerState::Cooldown => {
                self.cooldown_frames = self.cooldown_frames.saturating_sub(1);
                if self.cooldown_frames == 0 {
                    self.state = MarkerState::Idle;
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    const RATE: f64 = 50_000.0;
    const TONE: f32 = 1000.0;

    struct Harness {
        detector: MarkerDetector,
        sample_idx: u64,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                detector: MarkerDetector::new(RATE, TONE, MarkerConfig::default()).unwrap(),
                sample_idx: 0,
            }
        }

        fn dither(&mut self) -> f32 {
            let x = (self.sample_idx.wrapping_mul(6364136223846793005).wrapping_add(1) >> 33)
                as u32;
            0.02 * ((x as f32 / u32::MAX as f32) - 0.5)
        }

        fn run(&mut self, ms: f64, amp: f32) -> Vec<MinutePulseEvent> {
            let n = (ms / 1000.0 * RATE) as u64;
            let mut out = Vec::new();
            for _ in 0..n {
                let t = self.sample_idx as f32 / RATE as f32;
                let tone = amp * (2.0 * PI * TONE * t).cos();
                let s = Complex::new(tone + self.dither(), 0.0);
                self.sample_idx += 1;
                if let Some(ev) = self.detector.process(s) {
                    out.push(ev);
                }
            }
            out
        }
    }

    #[test]
    fn marker_pulse_is_detected_after_holdoff() {
        let mut h = Harness::new();
        // Past warmup and the 10 s startup holdoff.
        let mut events = h.run(12_000.0, 0.0);
        events.extend(h.run(800.0, 1.0));
        events.extend(h.run(3000.0, 0.0));

        assert_eq!(events.len(), 1, "expected one marker, got {:?}", events);
        let ev = events[0];
        assert_eq!(ev.source, MinutePulseSource::Accumulator);
        assert_eq!(ev.seq, 1);
        assert!(
            ev.duration_ms >= 500.0 && ev.duration_ms <= 2500.0,
            "implausible duration {}",
            ev.duration_ms
        );
        assert!(ev.metric > h.detector.baseline());
    }

    #[test]
    fn nothing_during_startup_holdoff() {
        let mut h = Harness::new();
        let mut events = h.run(5000.0, 0.0);
        events.extend(h.run(800.0, 1.0));
        // Falling edge still lands inside the 10 s holdoff.
        events.extend(h.run(1000.0, 0.0));
        assert!(events.is_empty(), "holdoff must suppress markers: {:?}", events);
    }

    #[test]
    fn cooldown_suppresses_back_to_back_markers() {
        let mut h = Harness::new();
        let mut events = h.run(12_000.0, 0.0);
        events.extend(h.run(800.0, 1.0));
        events.extend(h.run(5000.0, 0.0));
        // Second pulse only 6 s after the first: inside the 30 s cooldown.
        events.extend(h.run(800.0, 1.0));
        events.extend(h.run(3000.0, 0.0));
        assert_eq!(events.len(), 1, "cooldown should hold: {:?}", events);
    }

    #[test]
    fn reset_clears_accumulator_and_sequence() {
        let mut h = Harness::new();
        h.run(12_000.0, 0.0);
        h.run(800.0, 1.0);
        h.detector.reset();
        assert_eq!(h.detector.accumulated_energy(), 0.0);
        // Back in warmup afterwards.
        let events = h.run(500.0, 1.0);
        assert!(events.is_empty());
    }
}
