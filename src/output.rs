//! Audio pull side: feeds the engine's audio queue into an audio device.

use std::sync::Arc;

use crate::{queue::AudioQueue, recorder::Recorder};

#[cfg(feature = "cpal-output")]
pub mod cpal;

// -------------------------------------------------------------------------------------------------

/// Result of a single [`OutputCallback::process`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum StreamStatus {
    /// More audio may follow.
    Continue,
    /// The engine finished and the queue is drained: the stream can be closed.
    Complete,
}

// -------------------------------------------------------------------------------------------------

/// Pulls interleaved stereo samples from the engine's queue at the device's buffer cadence.
///
/// Missing samples are zero-filled and everything that got pulled is passed on to the engine's
/// recorder, when a recording is active. Never blocks for longer than the queue's lock.
#[derive(Clone)]
pub struct OutputCallback {
    queue: Arc<AudioQueue>,
    recorder: Arc<Recorder>,
}

impl OutputCallback {
    pub(crate) fn new(queue: Arc<AudioQueue>, recorder: Arc<Recorder>) -> Self {
        Self { queue, recorder }
    }

    /// Fill the given interleaved stereo output buffer.
    pub fn process(&mut self, output: &mut [f32]) -> StreamStatus {
        let popped = self.queue.pop(output);
        // Mute any remaining samples.
        output[popped..].iter_mut().for_each(|s| *s = 0.0);

        if popped > 0 {
            self.recorder.write(&output[..popped]);
            StreamStatus::Continue
        } else if self.queue.is_finished() {
            StreamStatus::Complete
        } else {
            StreamStatus::Continue
        }
    }
}

// -------------------------------------------------------------------------------------------------
