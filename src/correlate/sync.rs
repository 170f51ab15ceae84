//! Sync detector: top-level acquisition state machine
//!
//! Consumes minute-boundary candidates from two structurally different
//! sources (the tick detector's duration classifier and the marker
//! detector's accumulator) and turns them into a lock verdict.
//!
//! **Correlation rule**: at most one pending candidate per source. When
//! both sources hold one, timestamps within 1.5 s corroborate: confirm at
//! the earlier timestamp, tagged `Both`. Further apart, the earlier one is
//! confirmed alone. A lone candidate whose partner never shows is confirmed
//! alone after a 3 s timeout.
//!
//! **Acceptance rule**: a confirmation must land on a multiple of 60 s from
//! the last confirmed marker, within ±5 s (inclusive). Missed minutes are
//! fine, the multiple absorbs them. Anything else is reported as an
//! anomaly and ignored.
//!
//! ACQUIRING → TENTATIVE on the first accepted confirmation; TENTATIVE →
//! LOCKED once a confirmation validates a full ≥60 s interval; LOCKED
//! confirmations refresh the reference. Stream reset drops everything back
//! to ACQUIRING.

use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::event::{ConfirmationSource, MinutePulseSource, SyncReport, SyncState};

#[derive(Debug, Clone, Copy)]
struct Pending {
    timestamp_ms: f64,
}

pub struct SyncDetector {
    config: SyncConfig,
    pending_tick: Option<Pending>,
    pending_marker: Option<Pending>,
    state: SyncState,
    last_confirmed_ms: Option<f64>,
    last_source: Option<ConfirmationSource>,
    confirmed_count: u64,
    rejected_count: u64,
}

impl SyncDetector {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            pending_tick: None,
            pending_marker: None,
            state: SyncState::Acquiring,
            last_confirmed_ms: None,
            last_source: None,
            confirmed_count: 0,
            rejected_count: 0,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn last_confirmed_ms(&self) -> Option<f64> {
        self.last_confirmed_ms
    }

    pub fn last_source(&self) -> Option<ConfirmationSource> {
        self.last_source
    }

    pub fn confirmed_count(&self) -> u64 {
        self.confirmed_count
    }

    pub fn rejected_count(&self) -> u64 {
        self.rejected_count
    }

    /// Stream reset: back to ACQUIRING with no pending candidates.
    pub fn reset(&mut self) {
        self.pending_tick = None;
        self.pending_marker = None;
        self.state = SyncState::Acquiring;
        self.last_confirmed_ms = None;
        self.last_source = None;
        self.confirmed_count = 0;
        self.rejected_count = 0;
    }

    /// Submit a minute-pulse candidate from one source.
    pub fn submit(
        &mut self,
        source: MinutePulseSource,
        timestamp_ms: f64,
    ) -> Vec<SyncReport> {
        let mut reports = self.poll(timestamp_ms);

        let pending = Pending { timestamp_ms };
        match source {
            MinutePulseSource::TickPath => self.pending_tick = Some(pending),
            MinutePulseSource::Accumulator => self.pending_marker = Some(pending),
        }

        if let (Some(tick), Some(marker)) = (self.pending_tick, self.pending_marker) {
            let delta = (tick.timestamp_ms - marker.timestamp_ms).abs();
            let earlier = tick.timestamp_ms.min(marker.timestamp_ms);
            if delta <= self.config.correlation_window_ms {
                // Both detectors agree on this boundary.
                self.pending_tick = None;
                self.pending_marker = None;
                reports.push(self.confirm(earlier, ConfirmationSource::Both));
            } else {
                // Too far apart to be the same pulse: the earlier candidate
                // stands alone, the later keeps waiting for its partner.
                let source = if tick.timestamp_ms <= marker.timestamp_ms {
                    self.pending_tick = None;
                    ConfirmationSource::TickPath
                } else {
                    self.pending_marker = None;
                    ConfirmationSource::Accumulator
                };
                reports.push(self.confirm(earlier, source));
            }
        }
        reports
    }

    /// Advance time: confirm any lone candidate whose partner window expired.
    pub fn poll(&mut self, now_ms: f64) -> Vec<SyncReport> {
        let mut reports = Vec::new();
        if let Some(p) = self.pending_tick {
            if now_ms - p.timestamp_ms >= self.config.pending_timeout_ms {
                self.pending_tick = None;
                reports.push(self.confirm(p.timestamp_ms, ConfirmationSource::TickPath));
            }
        }
        if let Some(p) = self.pending_marker {
            if now_ms - p.timestamp_ms >= self.config.pending_timeout_ms {
                self.pending_marker = None;
                reports.push(self.confirm(p.timestamp_ms, ConfirmationSource::Accumulator));
            }
        }
        reports
    }

    fn confirm(&mut self, timestamp_ms: f64, source: ConfirmationSource) -> SyncReport {
        let nominal = self.config.nominal_interval_ms;
        let (interval_ms, error_ms, accepted, periods) = match self.last_confirmed_ms {
            None => (None, None, true, 0i64),
            Some(last) => {
                let interval = timestamp_ms - last;
                let periods = (interval / nominal).round() as i64;
                let error = (interval - periods as f64 * nominal).abs();
                (
                    Some(interval),
                    Some(error),
                    error <= self.config.interval_tolerance_ms,
                    periods,
                )
            }
        };

        if accepted {
            self.last_confirmed_ms = Some(timestamp_ms);
            self.last_source = Some(source);
            self.confirmed_count += 1;
            self.state = match self.state {
                SyncState::Acquiring => SyncState::Tentative,
                // A full minute interval validated against the 60 s rule
                // establishes the period; a short-range refresh does not.
                SyncState::Tentative if periods >= 1 => SyncState::Locked,
                other => other,
            };
            info!(
                timestamp_ms,
                ?source,
                interval_ms,
                state = ?self.state,
                "minute boundary confirmed"
            );
        } else {
            self.rejected_count += 1;
            warn!(
                timestamp_ms,
                ?source,
                interval_ms,
                error_ms,
                "minute boundary rejected: interval off the 60 s grid"
            );
        }

        SyncReport {
            timestamp_ms,
            source,
            interval_ms,
            error_ms,
            accepted,
            state: self.state,
        }
    }
}
