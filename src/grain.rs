//! Grain parameters, their randomization and the synthesis of grain samples.

mod random;
mod shaping;
mod synth;

pub use random::generate_random_grain;
pub use shaping::{apply_hann_envelope, white_noise};
pub use synth::{loop_window_start, read_grain, source_position, GrainSource};

// -------------------------------------------------------------------------------------------------

/// Parameters of a single grain. Created fresh for each grain by the scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GrainParameters {
    /// Index of the source file in the file registry.
    pub file_index: usize,
    /// Start position in the source file in native frames.
    pub start_frame: u64,
    /// Length of the grain in output frames.
    pub duration_frames: usize,
    /// Volume of the grain in range `0.0..=1.0`.
    pub amplitude: f32,
    /// When true, the grain repeats a window of the source instead of playing it through.
    pub loop_enabled: bool,
    /// Length of the loop window in native frames.
    pub loop_window_frames: u64,
    /// Signed shift in native frames of the loop window's start on each wrap.
    pub loop_drag_frames: i64,
}
