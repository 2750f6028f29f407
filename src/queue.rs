use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
    time::Duration,
};

use crate::settings::{CHANNEL_COUNT, SAMPLE_RATE};

// -------------------------------------------------------------------------------------------------

/// Bounded FIFO of interleaved output samples, shared by the grain scheduler (the producer)
/// and the audio output callback (the consumer).
///
/// Neither push nor pop ever block: push only accepts what fits and pop only delivers what is
/// available. Callers retry the remainder or zero-fill missing samples on their own.
pub struct AudioQueue {
    samples: Mutex<VecDeque<f32>>,
    capacity: usize,
    finished: AtomicBool,
}

impl AudioQueue {
    /// Create a new queue which holds at most `capacity` samples (not frames).
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            finished: AtomicBool::new(false),
        }
    }

    /// Max number of samples the queue can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of currently queued samples.
    pub fn len(&self) -> usize {
        self.samples.lock().map(|samples| samples.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of samples which can be pushed right now.
    pub fn free(&self) -> usize {
        self.capacity.saturating_sub(self.len())
    }

    /// Wall-clock time it takes the output to play the currently queued samples.
    pub fn queued_duration(&self) -> Duration {
        let frames = self.len() / CHANNEL_COUNT;
        Duration::from_secs_f64(frames as f64 / SAMPLE_RATE as f64)
    }

    /// Append as many samples as fit into the queue. Returns the number of accepted samples.
    pub fn push(&self, input: &[f32]) -> usize {
        let Ok(mut samples) = self.samples.lock() else {
            return 0;
        };
        let space = self.capacity.saturating_sub(samples.len());
        let accepted = input.len().min(space);
        samples.extend(&input[..accepted]);
        accepted
    }

    /// Move up to `output.len()` samples from the head of the queue into `output`.
    /// Returns the number of copied samples: the remaining output is left untouched.
    pub fn pop(&self, output: &mut [f32]) -> usize {
        let Ok(mut samples) = self.samples.lock() else {
            return 0;
        };
        let copied = output.len().min(samples.len());
        for (o, s) in output.iter_mut().zip(samples.drain(..copied)) {
            *o = s;
        }
        copied
    }

    /// Remove up to `max_count` samples from the head of the queue.
    pub fn pop_samples(&self, max_count: usize) -> Vec<f32> {
        let Ok(mut samples) = self.samples.lock() else {
            return Vec::new();
        };
        let count = max_count.min(samples.len());
        samples.drain(..count).collect()
    }

    /// Drop all queued samples and reset the finished flag.
    pub fn clear(&self) {
        if let Ok(mut samples) = self.samples.lock() {
            samples.clear();
        }
        self.finished.store(false, Ordering::Release);
    }

    /// True when the producer will never push any more data.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Signal that no more data will be pushed.
    pub fn set_finished(&self) {
        self.finished.store(true, Ordering::Release);
    }

    /// True when the queue is finished and fully drained.
    pub fn is_exhausted(&self) -> bool {
        self.is_finished() && self.is_empty()
    }
}

// -------------------------------------------------------------------------------------------------
