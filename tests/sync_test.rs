//! Correlator-level scenario tests
//!
//! Drives the correlation and fusion stages with synthetic detection events
//! (no sample processing), which makes minute-scale timing scenarios free.

use rustywwv::config::{ChainConfig, SyncConfig};
use rustywwv::correlate::{MarkerCorrelator, SyncDetector, TickCorrelator};
use rustywwv::event::{MarkerConfidence, SlowMarkerFrame, TickEvent};
use rustywwv::MinutePulseSource;
use rustywwv::SyncState;

fn tick(seq: u64, timestamp_ms: f64) -> TickEvent {
    TickEvent {
        seq,
        timestamp_ms,
        interval_ms: 0.0,
        duration_ms: 7.0,
        peak_energy: 0.5,
        avg_interval_ms: 0.0,
        noise_floor: 0.01,
        corr_peak: 9.0,
        corr_ratio: 18.0,
    }
}

fn slow_frame(timestamp_ms: f64, above_threshold: bool) -> SlowMarkerFrame {
    SlowMarkerFrame {
        seq: 0,
        timestamp_ms,
        energy: if above_threshold { 4.0 } else { 0.3 },
        snr_db: if above_threshold { 10.0 } else { -2.0 },
        noise_floor: 0.15,
        above_threshold,
    }
}

#[test]
fn marker_fusion_grades_fast_and_slow_agreement() {
    // A 600 ms fast candidate with no slow corroboration: LOW.
    let mut fusion = MarkerCorrelator::new(500.0, 500.0);
    fusion.fast_event(20_000.0, 600.0);
    for offset in [85.0, 170.0, 255.0, 340.0, 425.0] {
        assert!(fusion.slow_frame(&slow_frame(20_000.0 + offset, false)).is_none());
    }
    let verdict = fusion.slow_frame(&slow_frame(20_510.0, false)).unwrap();
    assert_eq!(verdict.confidence, MarkerConfidence::Low);

    // The same candidate with a slow trigger 200 ms in: HIGH.
    let mut fusion = MarkerCorrelator::new(500.0, 500.0);
    fusion.fast_event(20_000.0, 600.0);
    assert!(fusion.slow_frame(&slow_frame(20_200.0, true)).is_none());
    let verdict = fusion.slow_frame(&slow_frame(20_510.0, false)).unwrap();
    assert_eq!(verdict.confidence, MarkerConfidence::High);
    assert_eq!(verdict.timestamp_ms, 20_000.0);
}

#[test]
fn acquisition_ladder_acquiring_tentative_locked() {
    let mut sync = SyncDetector::new(SyncConfig::default());
    assert_eq!(sync.state(), SyncState::Acquiring);

    // First corroborated boundary.
    sync.submit(MinutePulseSource::TickPath, 60_000.0);
    let reports = sync.submit(MinutePulseSource::Accumulator, 60_400.0);
    assert_eq!(reports.len(), 1);
    assert!(reports[0].accepted);
    assert_eq!(sync.state(), SyncState::Tentative);

    // One minute later, again corroborated: lock.
    sync.submit(MinutePulseSource::TickPath, 120_000.0);
    let reports = sync.submit(MinutePulseSource::Accumulator, 120_300.0);
    assert!(reports[0].accepted);
    assert_eq!(sync.state(), SyncState::Locked);
}

#[test]
fn rejected_interval_does_not_poison_lock_progress() {
    let mut sync = SyncDetector::new(SyncConfig::default());
    sync.submit(MinutePulseSource::TickPath, 10_000.0);
    sync.submit(MinutePulseSource::Accumulator, 10_100.0);
    assert_eq!(sync.state(), SyncState::Tentative);

    // A spurious boundary 20 s later: periods=0 gives error 20 s, rejected.
    sync.submit(MinutePulseSource::TickPath, 30_000.0);
    let reports = sync.submit(MinutePulseSource::Accumulator, 30_200.0);
    assert!(!reports[0].accepted);
    assert_eq!(sync.state(), SyncState::Tentative);
    assert_eq!(sync.last_confirmed_ms(), Some(10_000.0));

    // The true boundary one minute after the first still locks.
    sync.submit(MinutePulseSource::TickPath, 70_000.0);
    let reports = sync.submit(MinutePulseSource::Accumulator, 70_150.0);
    assert!(reports[0].accepted);
    assert_eq!(sync.state(), SyncState::Locked);
}

#[test]
fn single_source_operation_locks_via_timeouts() {
    // Accumulator-only reception (tick path faded out entirely).
    let mut sync = SyncDetector::new(SyncConfig::default());
    sync.submit(MinutePulseSource::Accumulator, 30_000.0);
    let reports = sync.poll(33_000.0);
    assert_eq!(reports.len(), 1);
    assert!(reports[0].accepted);
    assert_eq!(sync.state(), SyncState::Tentative);

    sync.submit(MinutePulseSource::Accumulator, 90_000.0);
    let reports = sync.poll(93_500.0);
    assert!(reports[0].accepted);
    assert_eq!(sync.state(), SyncState::Locked);
}

#[test]
fn chain_survives_dropout_and_reports_inferred_tick() {
    let mut chains = TickCorrelator::new(ChainConfig::default());
    chains.add_tick(tick(1, 0.0));
    chains.add_tick(tick(2, 1000.0));
    // One missed second.
    let record = chains.add_tick(tick(3, 3000.0));
    assert_eq!(record.chain_id, 1);
    assert_eq!(record.chain_pos, 3);
    assert_eq!(chains.current_chain().inferred_count, 1);
    // And a genuine break afterwards.
    let record = chains.add_tick(tick(4, 3600.0));
    assert_eq!(record.chain_id, 2);
    assert_eq!(chains.closed_chains().len(), 1);
}

#[test]
fn sixty_ticks_then_marker_scenario() {
    // A minute of clean ticks feeding the chain correlator while the sync
    // detector waits for its first boundary, then a marker pair arrives.
    let mut chains = TickCorrelator::new(ChainConfig::default());
    let mut sync = SyncDetector::new(SyncConfig::default());

    for sec in 0..60u64 {
        let record = chains.add_tick(tick(sec + 1, sec as f64 * 1000.0));
        assert_eq!(record.chain_id, 1);
        let reports = sync.poll(sec as f64 * 1000.0);
        assert!(reports.is_empty());
    }
    assert_eq!(chains.current_chain().tick_count, 60);
    assert_eq!(chains.current_chain().total_drift_ms, 0.0);
    assert_eq!(chains.current_chain().confidence, 1.0);

    sync.submit(MinutePulseSource::TickPath, 59_800.0);
    let reports = sync.submit(MinutePulseSource::Accumulator, 60_600.0);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].timestamp_ms, 59_800.0);
    assert_eq!(sync.state(), SyncState::Tentative);
}
