//! Pipeline orchestration
//!
//! Owns every detector and correlator, splits the raw stream into the two
//! decimated paths, routes events between stages, and surfaces everything
//! to the caller as an ordered event vector per processed block.
//!
//! Single-threaded and call-driven: one `process_block` call filters,
//! decimates, detects, and correlates to completion before returning. Block
//! sizes are the caller's business; any size works, including empty.
//!
//! Routing (all internal, per sample):
//! - detector path → tick detector → tick correlator / sync detector
//! - detector path → marker detector → marker correlator + sync detector
//! - display path → tone trackers (carrier, subcarriers)
//! - display path → slow marker → marker correlator

use num::Complex;
use tracing::info;

use crate::config::PipelineConfig;
use crate::correlate::{MarkerCorrelator, SyncDetector, TickCorrelator};
use crate::correlate::chain::ChainStats;
use crate::detect::{
    MarkerDetector, SlowMarkerDetector, TickDetector, ToneMeasurement, ToneTracker,
};
use crate::detect::tick::TickOutput;
use crate::dsp::DecimatedPath;
use crate::error::ConfigError;
use crate::event::{ConfirmationSource, MarkerConfidence, PipelineEvent, SyncState};

/// On-demand telemetry snapshot for export/monitoring collaborators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Telemetry {
    pub sync_state: SyncState,
    pub last_confirmed_ms: Option<f64>,
    pub last_confirmation_source: Option<ConfirmationSource>,
    /// Verdict of the most recent completed fast/slow fusion window
    pub marker_confidence: Option<MarkerConfidence>,
    pub current_chain: ChainStats,
    pub chain_count: usize,
    pub carrier: ToneMeasurement,
    pub subcarriers: [ToneMeasurement; 2],
}

pub struct Pipeline {
    detector_path: DecimatedPath,
    display_path: DecimatedPath,

    tick: TickDetector,
    marker: MarkerDetector,
    slow_marker: SlowMarkerDetector,
    tone_carrier: ToneTracker,
    tone_sub: [ToneTracker; 2],

    chains: TickCorrelator,
    marker_fusion: MarkerCorrelator,
    sync: SyncDetector,

    raw_rate: f64,
    raw_count: u64,
}

impl Pipeline {
    /// Build the whole pipeline from one configuration.
    ///
    /// Fails (and refuses to process anything) on an invalid configuration.
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let detector_rate = config.detector_path.output_rate(config.raw_sample_rate);
        let display_rate = config.display_path.output_rate(config.raw_sample_rate);

        Ok(Self {
            detector_path: DecimatedPath::new(config.raw_sample_rate, config.detector_path)?,
            display_path: DecimatedPath::new(config.raw_sample_rate, config.display_path)?,
            tick: TickDetector::new(detector_rate, config.target_tone_hz, config.tick)?,
            marker: MarkerDetector::new(detector_rate, config.target_tone_hz, config.marker)?,
            slow_marker: SlowMarkerDetector::new(
                display_rate,
                config.target_tone_hz,
                config.slow_marker,
            )?,
            tone_carrier: ToneTracker::new(display_rate, 0.0, config.carrier_hz, config.tone)?,
            tone_sub: [
                ToneTracker::new(
                    display_rate,
                    config.subcarrier_hz[0],
                    config.carrier_hz,
                    config.tone,
                )?,
                ToneTracker::new(
                    display_rate,
                    config.subcarrier_hz[1],
                    config.carrier_hz,
                    config.tone,
                )?,
            ],
            chains: TickCorrelator::new(config.chain),
            marker_fusion: MarkerCorrelator::new(
                config.fusion_window_ms,
                config.marker.min_duration_ms,
            ),
            sync: SyncDetector::new(config.sync),
            raw_rate: config.raw_sample_rate,
            raw_count: 0,
        })
    }

    /// Process one block of raw I/Q samples.
    ///
    /// `reset` marks a stream discontinuity (hardware restart): all filter,
    /// detector, and correlator state is cleared before the block is
    /// processed. Returns every event the block produced, in sample order.
    pub fn process_block(
        &mut self,
        samples: &[Complex<f32>],
        reset: bool,
    ) -> Vec<PipelineEvent> {
        if reset {
            self.reset();
        }
        let mut events = Vec::new();

        for &raw in samples {
            self.raw_count += 1;
            let now_ms = self.raw_count as f64 / self.raw_rate * 1000.0;

            if let Some(s) = self.detector_path.push(raw) {
                match self.tick.process(s) {
                    Some(TickOutput::Tick(tick)) => {
                        events.push(PipelineEvent::Tick(self.chains.add_tick(tick)));
                    }
                    Some(TickOutput::MinutePulse(pulse)) => {
                        events.push(PipelineEvent::MinutePulse(pulse));
                        for report in self.sync.submit(pulse.source, pulse.timestamp_ms) {
                            events.push(PipelineEvent::Sync(report));
                        }
                    }
                    None => {}
                }

                if let Some(pulse) = self.marker.process(s) {
                    events.push(PipelineEvent::MinutePulse(pulse));
                    self.marker_fusion
                        .fast_event(pulse.timestamp_ms, pulse.duration_ms);
                    for report in self.sync.submit(pulse.source, pulse.timestamp_ms) {
                        events.push(PipelineEvent::Sync(report));
                    }
                }
            }

            if let Some(s) = self.display_path.push(raw) {
                self.tone_carrier.process(s);
                for tracker in self.tone_sub.iter_mut() {
                    tracker.process(s);
                }
                if let Some(frame) = self.slow_marker.process(s) {
                    events.push(PipelineEvent::SlowMarker(frame));
                    if let Some(verdict) = self.marker_fusion.slow_frame(&frame) {
                        events.push(PipelineEvent::Marker(verdict));
                    }
                }
            }

            // Lone sync candidates confirm by timeout even with no partner
            // event ever arriving.
            for report in self.sync.poll(now_ms) {
                events.push(PipelineEvent::Sync(report));
            }
        }

        events
    }

    /// Clear all state: filters, detectors, correlators, and sample counters.
    pub fn reset(&mut self) {
        info!("pipeline reset: clearing all detector and correlator state");
        self.detector_path.reset();
        self.display_path.reset();
        self.tick.reset();
        self.marker.reset();
        self.slow_marker.reset();
        self.tone_carrier.reset();
        for tracker in self.tone_sub.iter_mut() {
            tracker.reset();
        }
        self.chains.reset();
        self.marker_fusion.reset();
        self.sync.reset();
        self.raw_count = 0;
    }

    pub fn sync_state(&self) -> SyncState {
        self.sync.state()
    }

    /// Snapshot of everything a telemetry exporter would want.
    pub fn telemetry(&self) -> Telemetry {
        Telemetry {
            sync_state: self.sync.state(),
            last_confirmed_ms: self.sync.last_confirmed_ms(),
            last_confirmation_source: self.sync.last_source(),
            marker_confidence: self.marker_fusion.last_confidence(),
            current_chain: *self.chains.current_chain(),
            chain_count: self.chains.chain_count(),
            carrier: self.tone_carrier.measurement(),
            subcarriers: [
                self.tone_sub[0].measurement(),
                self.tone_sub[1].measurement(),
            ],
        }
    }

    /// Closed (immutable) chain records for reporting.
    pub fn closed_chains(&self) -> &[ChainStats] {
        self.chains.closed_chains()
    }
}
