use super::GrainParameters;
use crate::{registry::FileEntry, Error};

// -------------------------------------------------------------------------------------------------

/// Random access source of native, interleaved 16 bit integer frames for grains.
pub trait GrainSource {
    /// Native sample rate of the source.
    fn sample_rate(&self) -> u32;
    /// Native channel count of the source.
    fn channel_count(&self) -> usize;
    /// Total number of native frames in the source.
    fn total_frames(&self) -> u64;
    /// Read up to `frame_count` interleaved frames, starting at `start_frame`.
    /// May return less frames when the source ends before.
    fn read_frames(&self, start_frame: u64, frame_count: usize) -> Result<Vec<i16>, Error>;
}

impl GrainSource for FileEntry {
    fn sample_rate(&self) -> u32 {
        FileEntry::sample_rate(self)
    }

    fn channel_count(&self) -> usize {
        FileEntry::channel_count(self)
    }

    fn total_frames(&self) -> u64 {
        FileEntry::total_frames(self)
    }

    fn read_frames(&self, start_frame: u64, frame_count: usize) -> Result<Vec<i16>, Error> {
        // the decoder closes when the lease drops
        let mut decoder = self.open()?;
        decoder.read_frames(start_frame, frame_count)
    }
}

// -------------------------------------------------------------------------------------------------

/// Start of a loop window after `wraps` passes, shifted by `wraps * drag` frames from `start`
/// and clamped into `[0, total - window_len - 1]`.
pub fn loop_window_start(start: u64, wraps: u64, drag: i64, window_len: u64, total: u64) -> u64 {
    let latest_start = total.saturating_sub(window_len + 1) as i128;
    let shifted = start as i128 + wraps as i128 * drag as i128;
    shifted.clamp(0, latest_start) as u64
}

/// Fractional native source frame position of destination frame `dst_frame` of a grain.
///
/// `window_len` and `total` are only used when the grain loops: `window_len` is expected to
/// be the already clamped loop window length.
pub fn source_position(
    params: &GrainParameters,
    dst_frame: usize,
    rate_ratio: f64,
    window_len: u64,
    total: u64,
) -> f64 {
    let offset = dst_frame as f64 * rate_ratio;
    if !params.loop_enabled || window_len == 0 {
        return params.start_frame as f64 + offset;
    }
    let window = window_len as f64;
    let wraps = (offset / window).floor();
    let window_start = loop_window_start(
        params.start_frame,
        wraps as u64,
        params.loop_drag_frames,
        window_len,
        total,
    );
    window_start as f64 + (offset - wraps * window)
}

/// Clamped loop window length of a looping grain: at least 2 and at most a quarter of the
/// source's frames.
fn clamped_window_len(params: &GrainParameters, total: u64) -> u64 {
    params.loop_window_frames.min(total / 4).max(2)
}

// -------------------------------------------------------------------------------------------------

/// Synthesize the interleaved stereo samples of a grain at `target_rate`.
///
/// The whole source span a grain needs is decoded with a single read, then resampled with
/// linear interpolation. Mono sources are duplicated to both output channels.
///
/// Any error means the grain is unavailable. Callers should skip it and try another one.
pub fn read_grain<S: GrainSource + ?Sized>(
    source: &S,
    params: &GrainParameters,
    target_rate: u32,
) -> Result<Vec<f32>, Error> {
    let total = source.total_frames();
    let channel_count = source.channel_count();
    if channel_count == 0 || target_rate == 0 {
        return Err(Error::ParameterError(
            "invalid grain source or target rate".to_string(),
        ));
    }
    let rate_ratio = source.sample_rate() as f64 / target_rate as f64;
    let nominal = (params.duration_frames as f64 * rate_ratio).ceil() as u64 + 2;

    const SAFETY_FRAMES: u64 = 8;
    let (window_len, read_start, read_end) = if params.loop_enabled {
        let window_len = clamped_window_len(params, total);
        let estimated_wraps = nominal / window_len + 2;
        let worst_displacement =
            estimated_wraps.saturating_mul(params.loop_drag_frames.unsigned_abs());
        let headroom = worst_displacement.saturating_add(SAFETY_FRAMES);
        let tailroom = nominal
            .saturating_add(worst_displacement)
            .saturating_add(SAFETY_FRAMES);
        let latest_window_start = total.saturating_sub(window_len + 1);
        let read_start = params
            .start_frame
            .saturating_sub(headroom)
            .min(latest_window_start);
        let read_end = params.start_frame.saturating_add(tailroom).min(total);
        (window_len, read_start, read_end)
    } else {
        let read_end = params
            .start_frame
            .saturating_add(nominal + SAFETY_FRAMES)
            .min(total);
        (0, params.start_frame, read_end)
    };
    if read_end <= read_start {
        return Err(Error::SourceTooShort(0));
    }

    let samples = source.read_frames(read_start, (read_end - read_start) as usize)?;
    let frames_read = samples.len() / channel_count;
    if frames_read < 2 {
        return Err(Error::SourceTooShort(frames_read));
    }

    let max_position = (frames_read - 1) as f64;
    let mut output = Vec::with_capacity(params.duration_frames * 2);
    for dst_frame in 0..params.duration_frames {
        let position = source_position(params, dst_frame, rate_ratio, window_len, total);
        let local = (position - read_start as f64).clamp(0.0, max_position);
        let index = (local.floor() as usize).min(frames_read - 2);
        let fraction = (local - index as f64) as f32;

        let frame = &samples[index * channel_count..];
        let next_frame = &samples[(index + 1) * channel_count..];
        let interpolate = |channel: usize| {
            let a = frame[channel] as f32 / 32768.0;
            let b = next_frame[channel] as f32 / 32768.0;
            (a + (b - a) * fraction) * params.amplitude
        };
        let left = interpolate(0);
        let right = if channel_count > 1 {
            interpolate(1)
        } else {
            left
        };
        output.push(left);
        output.push(right);
    }
    Ok(output)
}

// -------------------------------------------------------------------------------------------------
