//! Detection events produced by the pipeline
//!
//! Events are plain owned data: the pipeline hands them to the caller by
//! value and keeps no reference afterward. Within one processing call,
//! events appear in the order their triggering samples occurred.

/// One detected second tick (~5 ms pulse at the target tone).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickEvent {
    /// Dense, monotonic per-detector sequence number (starts at 1)
    pub seq: u64,
    /// Milliseconds from stream start, measured at the pulse trailing edge
    pub timestamp_ms: f64,
    /// Time since the previous tick's leading edge (0 for the first tick)
    pub interval_ms: f64,
    pub duration_ms: f64,
    pub peak_energy: f32,
    /// Rolling short-window average of tick intervals
    pub avg_interval_ms: f64,
    pub noise_floor: f32,
    /// Matched-filter corroboration: peak correlation and peak-to-noise ratio
    pub corr_peak: f32,
    pub corr_ratio: f32,
}

/// Which detector produced a minute-pulse candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinutePulseSource {
    /// Duration-based classification inside the tick detector
    TickPath,
    /// Sliding-energy accumulator in the marker detector
    Accumulator,
}

/// A minute-marker candidate (long pulse at the target tone).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinutePulseEvent {
    pub seq: u64,
    pub source: MinutePulseSource,
    /// Trailing-edge timestamp in ms from stream start
    pub timestamp_ms: f64,
    pub duration_ms: f64,
    /// Time since the previous candidate from the same source (0 for the first)
    pub interval_ms: f64,
    /// Corroborating metric: correlation ratio (tick path) or peak
    /// accumulated energy (accumulator path)
    pub metric: f32,
}

/// Periodic corroboration frame from the slow (display-path) marker detector.
///
/// Not a discrete detection: one frame is emitted per accumulation step and
/// only the marker correlator gives it meaning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlowMarkerFrame {
    pub seq: u64,
    pub timestamp_ms: f64,
    /// Sliding-window accumulated bucket energy
    pub energy: f32,
    pub snr_db: f32,
    pub noise_floor: f32,
    pub above_threshold: bool,
}

/// Agreement level between the fast and slow marker paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerConfidence {
    None,
    Low,
    High,
}

/// Fused fast/slow marker verdict from the marker correlator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrelatedMarker {
    pub seq: u64,
    /// Fast-path candidate timestamp the fusion window was anchored to
    pub timestamp_ms: f64,
    pub duration_ms: f64,
    /// Peak slow-path accumulated energy seen inside the window
    pub slow_energy: f32,
    pub slow_snr_db: f32,
    pub confidence: MarkerConfidence,
}

/// Tick enriched with chain membership from the tick correlator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainedTick {
    pub tick: TickEvent,
    pub chain_id: u32,
    /// 1-based position within the chain
    pub chain_pos: u32,
    pub chain_start_ms: f64,
    /// Sum of (interval - nominal) over the chain so far
    pub drift_ms: f64,
}

/// Sync detector acquisition state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Acquiring,
    Tentative,
    Locked,
}

/// Which source(s) backed a confirmed minute boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationSource {
    TickPath,
    Accumulator,
    Both,
}

/// Outcome of one minute-boundary confirmation attempt.
///
/// `accepted == false` is the "anomalous interval" diagnostic annotation:
/// the candidate's spacing from the last confirmed marker did not land on a
/// 60-second multiple within tolerance, and state did not advance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncReport {
    pub timestamp_ms: f64,
    pub source: ConfirmationSource,
    /// Spacing from the previously confirmed marker (None for the first)
    pub interval_ms: Option<f64>,
    /// Error against the nearest 60 s multiple (None for the first)
    pub error_ms: Option<f64>,
    pub accepted: bool,
    /// State after this confirmation was applied
    pub state: SyncState,
}

/// Everything the pipeline can surface to its consumer, in sample order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PipelineEvent {
    Tick(ChainedTick),
    MinutePulse(MinutePulseEvent),
    SlowMarker(SlowMarkerFrame),
    Marker(CorrelatedMarker),
    Sync(SyncReport),
}
