
pub mod config;
pub mod correlate;
pub mod detect;
pub mod dsp;
pub mod error;
pub mod event;
pub mod pipeline;
pub mod simulation;
pub mod tracing_init;

pub use config::PipelineConfig;
pub use error::ConfigError;
pub use event::{
    MarkerConfidence, MinutePulseEvent, MinutePulseSource, PipelineEvent, SlowMarkerFrame,
    SyncState, TickEvent,
};
pub use pipeline::{Pipeline, Telemetry};
