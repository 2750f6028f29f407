//! Live granular settings and construction time engine configuration.

use std::{ops::RangeInclusive, time::Duration};

use crate::{telemetry::EventLog, Error};

// -------------------------------------------------------------------------------------------------

/// Fixed output sample rate of the engine.
pub const SAMPLE_RATE: u32 = 48000;
/// Fixed output channel count of the engine (interleaved stereo).
pub const CHANNEL_COUNT: usize = 2;

/// Converts a duration in milliseconds to frames at the given sample rate.
#[inline]
pub(crate) fn ms_to_frames(ms: usize, sample_rate: u32) -> usize {
    ms * sample_rate as usize / 1000
}

// -------------------------------------------------------------------------------------------------

/// Continuously adjustable grain generation settings.
///
/// Settings may be written at any time from any thread without validation. The scheduler
/// reads a [sanitized](Self::sanitized) snapshot once per grain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GranularSettings {
    /// Min grain duration in milliseconds.
    pub min_grain_ms: usize,
    /// Max grain duration in milliseconds.
    pub max_grain_ms: usize,
    /// Desired overlap between grains in milliseconds. Informational only: grains are
    /// played back sequentially and are never overlap-mixed.
    pub overlap_ms: usize,
    /// Reserved: the engine always renders a single grain stream.
    pub max_concurrent_grains: usize,
    /// Probability in range `0.0..=1.0` that a grain loops a window of its source.
    pub loop_probability: f32,
    /// Min loop window length in milliseconds.
    pub min_loop_window_ms: usize,
    /// Max loop window length in milliseconds.
    pub max_loop_window_ms: usize,
    /// Max absolute per-wrap loop window shift in milliseconds.
    pub max_loop_drag_ms: usize,
    /// Length of a white noise burst, played after each grain. 0 disables noise.
    pub white_noise_ms: usize,
    /// Amplitude of the white noise burst in range `0.0..=1.0`.
    pub white_noise_amplitude: f32,
    /// When true, grains are faded in and out with a Hann window.
    pub envelope: bool,
}

impl Default for GranularSettings {
    fn default() -> Self {
        Self {
            min_grain_ms: 50,
            max_grain_ms: 1200,
            overlap_ms: 20,
            max_concurrent_grains: 4,
            loop_probability: 0.0,
            min_loop_window_ms: 20,
            max_loop_window_ms: 620,
            max_loop_drag_ms: 25,
            white_noise_ms: 0,
            white_noise_amplitude: 0.1,
            envelope: false,
        }
    }
}

impl GranularSettings {
    pub const GRAIN_MS_RANGE: RangeInclusive<usize> = 1..=8000;
    pub const OVERLAP_MS_RANGE: RangeInclusive<usize> = 0..=500;
    pub const CONCURRENT_GRAINS_RANGE: RangeInclusive<usize> = 1..=16;
    pub const LOOP_WINDOW_MS_RANGE: RangeInclusive<usize> = 1..=5000;
    pub const LOOP_DRAG_MS_RANGE: RangeInclusive<usize> = 0..=500;
    pub const WHITE_NOISE_MS_RANGE: RangeInclusive<usize> = 0..=5000;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn grain_duration_ms(mut self, min: usize, max: usize) -> Self {
        self.min_grain_ms = min;
        self.max_grain_ms = max;
        self
    }

    pub fn loop_probability(mut self, probability: f32) -> Self {
        self.loop_probability = probability;
        self
    }

    pub fn loop_window_ms(mut self, min: usize, max: usize) -> Self {
        self.min_loop_window_ms = min;
        self.max_loop_window_ms = max;
        self
    }

    pub fn max_loop_drag_ms(mut self, drag: usize) -> Self {
        self.max_loop_drag_ms = drag;
        self
    }

    pub fn white_noise(mut self, duration_ms: usize, amplitude: f32) -> Self {
        self.white_noise_ms = duration_ms;
        self.white_noise_amplitude = amplitude;
        self
    }

    pub fn envelope(mut self, enabled: bool) -> Self {
        self.envelope = enabled;
        self
    }

    /// Copy of the settings with all values clamped into their valid ranges and with
    /// swapped min/max pairs, if min exceeds max.
    pub fn sanitized(&self) -> Self {
        fn clamp(value: usize, range: &RangeInclusive<usize>) -> usize {
            value.clamp(*range.start(), *range.end())
        }
        fn clamp_unit(value: f32) -> f32 {
            if value.is_nan() {
                0.0
            } else {
                value.clamp(0.0, 1.0)
            }
        }
        fn ordered(a: usize, b: usize) -> (usize, usize) {
            if a <= b {
                (a, b)
            } else {
                (b, a)
            }
        }

        let (min_grain_ms, max_grain_ms) = ordered(
            clamp(self.min_grain_ms, &Self::GRAIN_MS_RANGE),
            clamp(self.max_grain_ms, &Self::GRAIN_MS_RANGE),
        );
        let (min_loop_window_ms, max_loop_window_ms) = ordered(
            clamp(self.min_loop_window_ms, &Self::LOOP_WINDOW_MS_RANGE),
            clamp(self.max_loop_window_ms, &Self::LOOP_WINDOW_MS_RANGE),
        );
        Self {
            min_grain_ms,
            max_grain_ms,
            overlap_ms: clamp(self.overlap_ms, &Self::OVERLAP_MS_RANGE),
            max_concurrent_grains: clamp(
                self.max_concurrent_grains,
                &Self::CONCURRENT_GRAINS_RANGE,
            ),
            loop_probability: clamp_unit(self.loop_probability),
            min_loop_window_ms,
            max_loop_window_ms,
            max_loop_drag_ms: clamp(self.max_loop_drag_ms, &Self::LOOP_DRAG_MS_RANGE),
            white_noise_ms: clamp(self.white_noise_ms, &Self::WHITE_NOISE_MS_RANGE),
            white_noise_amplitude: clamp_unit(self.white_noise_amplitude),
            envelope: self.envelope,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Construction time options of an [`Engine`](crate::Engine).
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Capacity of the audio queue in samples (not frames). By default two seconds of audio.
    /// Must be a multiple of [`CHANNEL_COUNT`].
    pub queue_capacity: usize,
    /// Max number of lines the status log keeps.
    pub log_capacity: usize,
    /// Seed for the grain generator. When `None`, a random seed is used.
    pub seed: Option<u64>,
    /// Size of the chunks in frames in which grains are pushed into the queue.
    pub chunk_frames: usize,
    /// Sleep time before retrying to push into a full queue.
    pub push_retry_interval: Duration,
    /// Sleep time between two grains.
    pub grain_interval: Duration,
    /// By default true. Try promoting the scheduler thread to real-time priority.
    pub promote_scheduler_thread: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: SAMPLE_RATE as usize * CHANNEL_COUNT * 2,
            log_capacity: EventLog::DEFAULT_CAPACITY,
            seed: None,
            chunk_frames: 512,
            push_retry_interval: Duration::from_millis(1),
            grain_interval: Duration::from_millis(10),
            promote_scheduler_thread: true,
        }
    }
}

impl EngineConfig {
    pub fn queue_capacity(mut self, samples: usize) -> Self {
        self.queue_capacity = samples;
        self
    }

    pub fn log_capacity(mut self, lines: usize) -> Self {
        self.log_capacity = lines;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn chunk_frames(mut self, frames: usize) -> Self {
        self.chunk_frames = frames;
        self
    }

    pub fn push_retry_interval(mut self, interval: Duration) -> Self {
        self.push_retry_interval = interval;
        self
    }

    pub fn grain_interval(mut self, interval: Duration) -> Self {
        self.grain_interval = interval;
        self
    }

    pub fn promote_scheduler_thread(mut self, promote: bool) -> Self {
        self.promote_scheduler_thread = promote;
        self
    }

    /// Validate all options. Returns Error::ParameterError on errors.
    pub fn validate(&self) -> Result<(), Error> {
        if self.queue_capacity == 0 || self.queue_capacity % CHANNEL_COUNT != 0 {
            return Err(Error::ParameterError(format!(
                "engine config 'queue_capacity' must be a non zero multiple of {CHANNEL_COUNT}, but is '{}'",
                self.queue_capacity
            )));
        }
        if self.log_capacity == 0 {
            return Err(Error::ParameterError(
                "engine config 'log_capacity' must not be zero".to_string(),
            ));
        }
        if self.chunk_frames == 0 {
            return Err(Error::ParameterError(
                "engine config 'chunk_frames' must not be zero".to_string(),
            ));
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_swaps_and_clamps() {
        let settings = GranularSettings {
            min_grain_ms: 900,
            max_grain_ms: 0,
            overlap_ms: 10_000,
            max_concurrent_grains: 0,
            loop_probability: f32::NAN,
            min_loop_window_ms: 7000,
            max_loop_window_ms: 30,
            max_loop_drag_ms: 1000,
            white_noise_ms: 9000,
            white_noise_amplitude: -2.0,
            envelope: true,
        }
        .sanitized();

        assert_eq!((settings.min_grain_ms, settings.max_grain_ms), (1, 900));
        assert_eq!(settings.overlap_ms, 500);
        assert_eq!(settings.max_concurrent_grains, 1);
        assert_eq!(settings.loop_probability, 0.0);
        assert_eq!(
            (settings.min_loop_window_ms, settings.max_loop_window_ms),
            (30, 5000)
        );
        assert_eq!(settings.max_loop_drag_ms, 500);
        assert_eq!(settings.white_noise_ms, 5000);
        assert_eq!(settings.white_noise_amplitude, 0.0);
        assert!(settings.envelope);

        let defaults = GranularSettings::default();
        assert_eq!(defaults.sanitized(), defaults);
    }

    #[test]
    fn config_validation() {
        assert!(EngineConfig::default().validate().is_ok());
        assert!(EngineConfig::default().queue_capacity(0).validate().is_err());
        assert!(EngineConfig::default().queue_capacity(1001).validate().is_err());
        assert!(EngineConfig::default().log_capacity(0).validate().is_err());
        assert!(EngineConfig::default().chunk_frames(0).validate().is_err());
    }

    #[test]
    fn ms_conversion() {
        assert_eq!(ms_to_frames(1000, SAMPLE_RATE), 48000);
        assert_eq!(ms_to_frames(50, 44100), 2205);
    }
}
