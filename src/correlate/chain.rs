//! Tick chain correlator
//!
//! Groups consecutive ticks into chains: a chain continues while inter-tick
//! intervals stay inside the tolerance window around the nominal 1 second,
//! and accumulates drift (`interval - 1000 ms`) across its members. A tick
//! outside tolerance closes the chain (the closed record stays immutable
//! for reporting) and starts a fresh one.
//!
//! One forgiveness case: an interval of roughly two seconds is read as a
//! single missed tick (HF fades routinely swallow one pulse). The chain
//! continues, the gap's drift is split across both ticks, and the chain's
//! inferred-tick counter increments.
//!
//! Purely a reporting stage; sync acquisition never depends on it.

use tracing::{debug, info};

use crate::config::ChainConfig;
use crate::event::{ChainedTick, TickEvent};

/// Recent intervals kept for the jitter statistic.
const JITTER_WINDOW: usize = 5;

/// Aggregate statistics for one chain (current or closed).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainStats {
    pub chain_id: u32,
    /// Detected ticks in the chain
    pub tick_count: u32,
    /// Ticks inferred across ~2 s single-dropout gaps
    pub inferred_count: u32,
    pub start_ms: f64,
    pub end_ms: f64,
    pub avg_interval_ms: f64,
    pub min_interval_ms: f64,
    pub max_interval_ms: f64,
    /// Sum of (interval - nominal) across members
    pub total_drift_ms: f64,
    /// Standard deviation of the last few intervals (0 until enough data)
    pub jitter_ms: f64,
    /// 1.0 at zero jitter, fading to 0.0 at 50 ms
    pub confidence: f64,
}

impl ChainStats {
    fn open(chain_id: u32, start_ms: f64) -> Self {
        Self {
            chain_id,
            tick_count: 0,
            inferred_count: 0,
            start_ms,
            end_ms: start_ms,
            avg_interval_ms: 0.0,
            min_interval_ms: f64::MAX,
            max_interval_ms: 0.0,
            total_drift_ms: 0.0,
            jitter_ms: 0.0,
            confidence: 0.0,
        }
    }
}

pub struct TickCorrelator {
    config: ChainConfig,
    current: ChainStats,
    closed: Vec<ChainStats>,
    last_tick_ms: Option<f64>,
    cumulative_drift_ms: f64,
    recent_intervals: [f64; JITTER_WINDOW],
    recent_idx: usize,
    recent_count: usize,
    correlated: u64,
    uncorrelated: u64,
}

impl TickCorrelator {
    pub fn new(config: ChainConfig) -> Self {
        Self {
            config,
            current: ChainStats::open(0, 0.0),
            closed: Vec::new(),
            last_tick_ms: None,
            cumulative_drift_ms: 0.0,
            recent_intervals: [0.0; JITTER_WINDOW],
            recent_idx: 0,
            recent_count: 0,
            correlated: 0,
            uncorrelated: 0,
        }
    }

    /// Fold one tick into chain bookkeeping; returns the enriched record.
    pub fn add_tick(&mut self, tick: TickEvent) -> ChainedTick {
        let interval = self.last_tick_ms.map(|t| tick.timestamp_ms - t);

        let mut drift_this_tick = 0.0;
        match interval {
            None => self.start_chain(tick.timestamp_ms),
            Some(iv) => {
                let cfg = &self.config;
                if iv > cfg.min_interval_ms && iv < cfg.max_interval_ms {
                    drift_this_tick = iv - cfg.nominal_interval_ms;
                    self.correlated += 1;
                } else if iv >= cfg.skip_min_ms && iv <= cfg.skip_max_ms {
                    // One missed tick: continue the chain, split the gap's drift.
                    drift_this_tick = (iv - 2.0 * cfg.nominal_interval_ms) / 2.0;
                    self.current.inferred_count += 1;
                    self.correlated += 1;
                    debug!(
                        chain_id = self.current.chain_id,
                        interval_ms = iv,
                        "single dropout inferred"
                    );
                } else {
                    self.start_chain(tick.timestamp_ms);
                    self.uncorrelated += 1;
                }
            }
        }

        self.current.tick_count += 1;
        self.cumulative_drift_ms += drift_this_tick;
        self.current.total_drift_ms = self.cumulative_drift_ms;
        self.current.end_ms = tick.timestamp_ms;

        // Interval statistics only make sense past the chain's first member.
        if let Some(iv) = interval {
            if self.current.tick_count > 1 {
                self.current.min_interval_ms = self.current.min_interval_ms.min(iv);
                self.current.max_interval_ms = self.current.max_interval_ms.max(iv);
                let n = (self.current.tick_count - 1) as f64;
                self.current.avg_interval_ms =
                    ((n - 1.0) * self.current.avg_interval_ms + iv) / n;

                self.recent_intervals[self.recent_idx] = iv;
                self.recent_idx = (self.recent_idx + 1) % JITTER_WINDOW;
                self.recent_count = (self.recent_count + 1).min(JITTER_WINDOW);
                self.update_jitter();
            }
        }

        self.last_tick_ms = Some(tick.timestamp_ms);
        ChainedTick {
            tick,
            chain_id: self.current.chain_id,
            chain_pos: self.current.tick_count,
            chain_start_ms: self.current.start_ms,
            drift_ms: self.cumulative_drift_ms,
        }
    }

    /// The chain currently being extended.
    pub fn current_chain(&self) -> &ChainStats {
        &self.current
    }

    /// Closed chains, oldest first. Immutable once closed.
    pub fn closed_chains(&self) -> &[ChainStats] {
        &self.closed
    }

    pub fn chain_count(&self) -> usize {
        self.closed.len() + usize::from(self.current.chain_id > 0)
    }

    /// Ticks that continued a chain (including inferred-dropout continuations).
    pub fn correlated_count(&self) -> u64 {
        self.correlated
    }

    /// Ticks that broke a chain and started a new one.
    pub fn uncorrelated_count(&self) -> u64 {
        self.uncorrelated
    }

    pub fn reset(&mut self) {
        self.current = ChainStats::open(0, 0.0);
        self.closed.clear();
        self.last_tick_ms = None;
        self.cumulative_drift_ms = 0.0;
        self.recent_count = 0;
        self.recent_idx = 0;
        self.correlated = 0;
        self.uncorrelated = 0;
    }

    fn start_chain(&mut self, start_ms: f64) {
        if self.current.chain_id > 0 {
            info!(
                chain_id = self.current.chain_id,
                ticks = self.current.tick_count,
                drift_ms = self.current.total_drift_ms,
                "chain closed"
            );
            self.closed.push(self.current);
        }
        let next_id = self.current.chain_id + 1;
        self.current = ChainStats::open(next_id, start_ms);
        self.cumulative_drift_ms = 0.0;
        self.recent_count = 0;
        self.recent_idx = 0;
    }

    fn update_jitter(&mut self) {
        if self.recent_count < 4 {
            return;
        }
        let n = self.recent_count as f64;
        let slice = &self.recent_intervals[..self.recent_count];
        let mean = slice.iter().sum::<f64>() / n;
        let variance = slice.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        self.current.jitter_ms = variance.max(0.0).sqrt();
        self.current.confidence = (1.0 - self.current.jitter_ms / 50.0).clamp(0.0, 1.0);
    }
}
