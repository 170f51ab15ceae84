//! Pipeline configuration
//!
//! All operating-point parameters live here: station tones, sample rates,
//! path cutoffs/ratios, and the empirically chosen detector thresholds.
//! None of these change the algorithms, only where they bite. Every
//! threshold multiplier is a field rather than a hard-coded constant so
//! test harnesses and regional variants (1200 Hz tone stations) can move
//! them without touching detector code.

use crate::error::ConfigError;

/// One decimation path: 2nd-order Butterworth lowpass + integer sample dropping.
#[derive(Debug, Clone, Copy)]
pub struct PathConfig {
    /// Lowpass cutoff in Hz (applied per channel, I and Q)
    pub cutoff_hz: f32,
    /// Keep one sample out of every `ratio`
    pub ratio: u32,
}

impl PathConfig {
    pub fn output_rate(&self, input_rate: f64) -> f64 {
        input_rate / self.ratio as f64
    }
}

/// Tick detector operating point.
///
/// Defaults match the proven field values: 2x noise-floor trigger with 0.7
/// hysteresis, asymmetric floor adaptation (fast down, slow up), and a
/// matched-filter corroboration gate at 3x its own noise estimate.
#[derive(Debug, Clone, Copy)]
pub struct TickConfig {
    pub fft_size: usize,
    pub bandwidth_hz: f32,
    pub threshold_mult: f32,
    pub hysteresis_ratio: f32,
    pub noise_adapt_down: f32,
    pub noise_adapt_up: f32,
    pub noise_floor_max: f32,
    pub warmup_frames: u64,
    pub warmup_adapt_rate: f32,
    pub cooldown_ms: f64,
    /// Valid tick pulse duration window
    pub tick_min_ms: f64,
    pub tick_max_ms: f64,
    /// Long-pulse (minute marker) duration window for the tick-path classifier
    pub marker_min_ms: f64,
    pub marker_max_ms: f64,
    /// Ticks closer than this to the previous tick are rejected
    pub min_interval_ms: f64,
    /// Matched filter: nominal pulse length and evaluation stride
    pub template_ms: f64,
    pub corr_stride: u64,
    pub corr_threshold_mult: f32,
    pub corr_noise_adapt: f32,
    /// Rolling-average window for the interval statistic
    pub avg_window_ms: f64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            fft_size: 256,
            bandwidth_hz: 100.0,
            threshold_mult: 2.0,
            hysteresis_ratio: 0.7,
            noise_adapt_down: 0.002,
            noise_adapt_up: 0.0002,
            noise_floor_max: 5.0,
            warmup_frames: 50,
            warmup_adapt_rate: 0.05,
            cooldown_ms: 500.0,
            tick_min_ms: 2.0,
            tick_max_ms: 50.0,
            marker_min_ms: 600.0,
            marker_max_ms: 1500.0,
            min_interval_ms: 800.0,
            template_ms: 5.0,
            corr_stride: 8,
            corr_threshold_mult: 3.0,
            corr_noise_adapt: 0.01,
            avg_window_ms: 15_000.0,
        }
    }
}

/// Fast-path marker detector operating point.
#[derive(Debug, Clone, Copy)]
pub struct MarkerConfig {
    pub fft_size: usize,
    /// Wider than the tick bucket: the 800 ms pulse occupies more spectrum
    pub bandwidth_hz: f32,
    /// Sliding accumulator span; sized to roughly one expected pulse
    pub window_ms: f64,
    pub threshold_mult: f32,
    pub baseline_adapt_rate: f32,
    pub warmup_frames: u64,
    pub warmup_adapt_rate: f32,
    /// No markers declared during initial baseline settling
    pub startup_holdoff_ms: f64,
    pub min_duration_ms: f64,
    pub max_duration_ms: f64,
    pub cooldown_ms: f64,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            fft_size: 256,
            bandwidth_hz: 200.0,
            window_ms: 1000.0,
            threshold_mult: 3.0,
            baseline_adapt_rate: 0.001,
            warmup_frames: 200,
            warmup_adapt_rate: 0.02,
            startup_holdoff_ms: 10_000.0,
            min_duration_ms: 500.0,
            max_duration_ms: 5000.0,
            cooldown_ms: 30_000.0,
        }
    }
}

/// Slow (display-path) marker corroborator operating point.
#[derive(Debug, Clone, Copy)]
pub struct SlowMarkerConfig {
    pub fft_size: usize,
    pub bandwidth_hz: f32,
    /// Frames summed in the sliding accumulator (~850 ms at the display frame rate)
    pub accum_frames: usize,
    pub threshold_mult: f32,
    pub noise_adapt_rate: f32,
}

impl Default for SlowMarkerConfig {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            bandwidth_hz: 100.0,
            accum_frames: 10,
            threshold_mult: 2.0,
            noise_adapt_rate: 0.02,
        }
    }
}

/// Tone tracker operating point (carrier + subcarriers).
#[derive(Debug, Clone, Copy)]
pub struct ToneConfig {
    pub fft_size: usize,
    /// Peak search span around the nominal bin
    pub search_bins: usize,
    /// Minimum SNR for a measurement to be reported valid
    pub min_snr_db: f32,
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            fft_size: 4096,
            search_bins: 10,
            min_snr_db: 10.0,
        }
    }
}

/// Tick-chain correlator tolerances.
#[derive(Debug, Clone, Copy)]
pub struct ChainConfig {
    pub nominal_interval_ms: f64,
    /// Intervals strictly inside (min, max) continue the current chain
    pub min_interval_ms: f64,
    pub max_interval_ms: f64,
    /// A ~2 s gap is treated as exactly one missed tick rather than a break
    pub skip_min_ms: f64,
    pub skip_max_ms: f64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            nominal_interval_ms: 1000.0,
            min_interval_ms: 900.0,
            max_interval_ms: 1050.0,
            skip_min_ms: 1900.0,
            skip_max_ms: 2100.0,
        }
    }
}

/// Sync detector tolerances.
#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
    /// Tick-path and accumulator-path candidates within this window corroborate
    pub correlation_window_ms: f64,
    /// A lone pending candidate is confirmed by itself after this long
    pub pending_timeout_ms: f64,
    pub nominal_interval_ms: f64,
    /// Accepted error against the nearest 60 s multiple (inclusive)
    pub interval_tolerance_ms: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            correlation_window_ms: 1500.0,
            pending_timeout_ms: 3000.0,
            nominal_interval_ms: 60_000.0,
            interval_tolerance_ms: 5000.0,
        }
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Raw I/Q rate from the front end (nominal 2 MHz)
    pub raw_sample_rate: f64,
    /// RF carrier frequency, used only for PPM scaling of tone offsets
    pub carrier_hz: f64,
    /// Tick/marker tone: 1000 Hz, or 1200 Hz for the regional variant
    pub target_tone_hz: f32,
    /// Reference subcarriers measured by the tone trackers
    pub subcarrier_hz: [f32; 2],
    pub detector_path: PathConfig,
    pub display_path: PathConfig,
    pub tick: TickConfig,
    pub marker: MarkerConfig,
    pub slow_marker: SlowMarkerConfig,
    pub tone: ToneConfig,
    pub chain: ChainConfig,
    pub sync: SyncConfig,
    /// Fast/slow marker fusion window
    pub fusion_window_ms: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            raw_sample_rate: 2_000_000.0,
            carrier_hz: 10_000_000.0,
            target_tone_hz: 1000.0,
            subcarrier_hz: [500.0, 600.0],
            detector_path: PathConfig {
                cutoff_hz: 5000.0,
                ratio: 40,
            },
            display_path: PathConfig {
                cutoff_hz: 6000.0,
                ratio: 166,
            },
            tick: TickConfig::default(),
            marker: MarkerConfig::default(),
            slow_marker: SlowMarkerConfig::default(),
            tone: ToneConfig::default(),
            chain: ChainConfig::default(),
            sync: SyncConfig::default(),
            fusion_window_ms: 500.0,
        }
    }
}

impl PipelineConfig {
    /// Validate everything that would make the pipeline unrunnable.
    ///
    /// Called by `Pipeline::new`; the pipeline refuses to construct on error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.raw_sample_rate > 0.0) {
            return Err(ConfigError::InvalidSampleRate {
                rate: self.raw_sample_rate,
            });
        }
        for path in [&self.detector_path, &self.display_path] {
            if path.ratio == 0 {
                return Err(ConfigError::ZeroDecimation);
            }
            if !(path.cutoff_hz > 0.0) || f64::from(path.cutoff_hz) >= self.raw_sample_rate / 2.0 {
                return Err(ConfigError::InvalidCutoff {
                    cutoff_hz: path.cutoff_hz,
                    sample_rate: self.raw_sample_rate,
                });
            }
        }
        for (size, bandwidth) in [
            (self.tick.fft_size, self.tick.bandwidth_hz),
            (self.marker.fft_size, self.marker.bandwidth_hz),
            (self.slow_marker.fft_size, self.slow_marker.bandwidth_hz),
        ] {
            if size == 0 || !size.is_power_of_two() {
                return Err(ConfigError::InvalidFftSize { size });
            }
            if !(bandwidth > 0.0) {
                return Err(ConfigError::InvalidBandwidth {
                    bandwidth_hz: bandwidth,
                });
            }
        }
        if self.tone.fft_size == 0 || !self.tone.fft_size.is_power_of_two() {
            return Err(ConfigError::InvalidFftSize {
                size: self.tone.fft_size,
            });
        }
        let detector_rate = self.detector_path.output_rate(self.raw_sample_rate);
        if f64::from(self.target_tone_hz) >= detector_rate / 2.0 || self.target_tone_hz <= 0.0 {
            return Err(ConfigError::ToneAboveNyquist {
                tone_hz: self.target_tone_hz,
                sample_rate: detector_rate,
            });
        }
        for (name, value) in [
            ("tick threshold multiplier", self.tick.threshold_mult),
            ("tick hysteresis ratio", self.tick.hysteresis_ratio),
            ("marker threshold multiplier", self.marker.threshold_mult),
            ("slow-marker threshold multiplier", self.slow_marker.threshold_mult),
        ] {
            if !(value > 0.0) {
                return Err(ConfigError::InvalidMultiplier { name, value });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_sample_rate() {
        let mut cfg = PipelineConfig::default();
        cfg.raw_sample_rate = 0.0;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::InvalidSampleRate { rate: 0.0 })
        );
    }

    #[test]
    fn rejects_zero_decimation() {
        let mut cfg = PipelineConfig::default();
        cfg.detector_path.ratio = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroDecimation));
    }

    #[test]
    fn rejects_non_power_of_two_fft() {
        let mut cfg = PipelineConfig::default();
        cfg.tick.fft_size = 300;
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidFftSize { size: 300 }));
    }

    #[test]
    fn rejects_negative_bandwidth() {
        let mut cfg = PipelineConfig::default();
        cfg.marker.bandwidth_hz = -10.0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidBandwidth { .. })
        ));
    }

    #[test]
    fn regional_variant_validates() {
        let mut cfg = PipelineConfig::default();
        cfg.target_tone_hz = 1200.0;
        assert!(cfg.validate().is_ok());
    }
}
