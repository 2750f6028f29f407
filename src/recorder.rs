//! Records the engine's output stream into a 16 bit PCM WAV file.

use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::{
    settings::{CHANNEL_COUNT, SAMPLE_RATE},
    Error,
};

// -------------------------------------------------------------------------------------------------

const BYTES_PER_SAMPLE: u64 = 2;

/// Result of a finished recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingSummary {
    /// Path of the written WAV file.
    pub path: PathBuf,
    /// Size of the written sample data in bytes, excluding the header.
    pub data_bytes: u64,
    /// Duration of the recording.
    pub duration: Duration,
}

struct Recording {
    path: PathBuf,
    writer: WavWriter<BufWriter<File>>,
    data_bytes: u64,
    failed: bool,
}

// -------------------------------------------------------------------------------------------------

/// Writes interleaved float frames at the engine's fixed rate and channel layout into a
/// WAV file. The file's header sizes get finalized when the recording stops.
///
/// All operations share a single lock, so writes may be done from the audio thread while
/// recordings get started or stopped from other threads.
#[derive(Default)]
pub struct Recorder {
    recording: Mutex<Option<Recording>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a recording is active.
    pub fn is_active(&self) -> bool {
        self.recording
            .lock()
            .map(|recording| recording.is_some())
            .unwrap_or(false)
    }

    /// Start recording into a new file at the given path.
    /// Fails when a recording is already active or the file can't be created.
    pub fn start<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let mut recording = self
            .recording
            .lock()
            .map_err(|_| Error::RecordingError("recorder lock is poisoned".into()))?;
        if recording.is_some() {
            return Err(Error::RecordingAlreadyActive);
        }
        let spec = WavSpec {
            channels: CHANNEL_COUNT as u16,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let path = path.as_ref().to_path_buf();
        let writer = WavWriter::create(&path, spec)?;
        log::info!("Started recording into '{}'", path.display());
        *recording = Some(Recording {
            path,
            writer,
            data_bytes: 0,
            failed: false,
        });
        Ok(())
    }

    /// Append interleaved float samples to the active recording, if any. Samples are
    /// clamped to `-1.0..=1.0` and converted to 16 bit integers.
    ///
    /// Write errors are logged once. The recording then stops accumulating data, but stays
    /// active until it gets stopped.
    pub fn write(&self, samples: &[f32]) {
        let Ok(mut recording) = self.recording.lock() else {
            return;
        };
        let Some(recording) = recording.as_mut() else {
            return;
        };
        if recording.failed {
            return;
        }
        for sample in samples {
            let value = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
            if let Err(err) = recording.writer.write_sample(value) {
                log::error!(
                    "Failed to write recording '{}': {err}",
                    recording.path.display()
                );
                recording.failed = true;
                return;
            }
            recording.data_bytes += BYTES_PER_SAMPLE;
        }
    }

    /// Stop the active recording and finalize the file's header.
    pub fn stop(&self) -> Result<RecordingSummary, Error> {
        let recording = self
            .recording
            .lock()
            .map_err(|_| Error::RecordingError("recorder lock is poisoned".into()))?
            .take()
            .ok_or(Error::RecordingNotActive)?;
        let Recording {
            path,
            writer,
            data_bytes,
            ..
        } = recording;
        writer.finalize()?;

        let frames = data_bytes / (BYTES_PER_SAMPLE * CHANNEL_COUNT as u64);
        let duration = Duration::from_secs_f64(frames as f64 / SAMPLE_RATE as f64);
        log::info!(
            "Stopped recording into '{}' ({data_bytes} bytes, {:.2} s)",
            path.display(),
            duration.as_secs_f64()
        );
        Ok(RecordingSummary {
            path,
            data_bytes,
            duration,
        })
    }
}

// -------------------------------------------------------------------------------------------------
