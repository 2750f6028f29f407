#![cfg_attr(feature = "cpal-output", doc = include_str!("../README.md"))]

// private mods (will be partly re-exported)
mod engine;
mod error;
mod queue;
mod recorder;
mod registry;
mod scheduler;
mod settings;
mod telemetry;

// public, flat re-exports
pub use engine::{Engine, EngineState};
pub use error::Error;
pub use queue::AudioQueue;
pub use recorder::{Recorder, RecordingSummary};
pub use registry::{DecoderLease, FileEntry, FileRegistry, LoadReport, ScanOptions};
pub use settings::{EngineConfig, GranularSettings, CHANNEL_COUNT, SAMPLE_RATE};
pub use telemetry::{EventLog, GrainDebugInfo, GrainMonitor};

pub use grain::{
    apply_hann_envelope, generate_random_grain, loop_window_start, read_grain, source_position,
    white_noise, GrainParameters, GrainSource,
};
pub use output::{OutputCallback, StreamStatus};

#[cfg(feature = "cpal-output")]
pub use output::cpal::CpalOutput;

// public mods
pub mod decoder;
pub mod grain;
pub mod output;
