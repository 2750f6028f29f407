//! The grain scheduler thread: the only producer of the engine's audio queue.

use std::{
    io,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use rand::{rngs::SmallRng, SeedableRng};

use crate::{
    grain::{apply_hann_envelope, generate_random_grain, read_grain, white_noise, GrainParameters},
    queue::AudioQueue,
    registry::FileRegistry,
    settings::{ms_to_frames, EngineConfig, GranularSettings, CHANNEL_COUNT, SAMPLE_RATE},
    telemetry::{EventLog, GrainDebugInfo, GrainMonitor},
};

// -------------------------------------------------------------------------------------------------

/// Mixed into the configured seed to seed the separate noise generator.
const NOISE_SEED_SALT: u64 = 0x9E37_79B9_7F4A_7C15;

// -------------------------------------------------------------------------------------------------

/// State shared by the engine, the scheduler thread and the audio output.
pub(crate) struct SharedState {
    pub settings: Mutex<GranularSettings>,
    pub rng: Mutex<SmallRng>,
    pub noise_rng: Mutex<SmallRng>,
    pub queue: Arc<AudioQueue>,
    pub monitor: GrainMonitor,
    pub log: EventLog,
    pub finished: AtomicBool,
}

impl SharedState {
    pub fn new(config: &EngineConfig) -> Self {
        let (rng, noise_rng) = match config.seed {
            Some(seed) => (
                SmallRng::seed_from_u64(seed),
                SmallRng::seed_from_u64(seed ^ NOISE_SEED_SALT),
            ),
            None => (
                SmallRng::from_rng(&mut rand::rng()),
                SmallRng::from_rng(&mut rand::rng()),
            ),
        };
        Self {
            settings: Mutex::new(GranularSettings::default()),
            rng: Mutex::new(rng),
            noise_rng: Mutex::new(noise_rng),
            queue: Arc::new(AudioQueue::new(config.queue_capacity)),
            monitor: GrainMonitor::new(),
            log: EventLog::new(config.log_capacity),
            finished: AtomicBool::new(true),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Sanitized copy of the current settings.
    pub fn settings_snapshot(&self) -> GranularSettings {
        self.settings
            .lock()
            .map(|settings| settings.sanitized())
            .unwrap_or_default()
    }

    /// Mark the engine and the queue as finished.
    pub fn finish(&self) {
        self.finished.store(true, Ordering::Release);
        self.queue.set_finished();
    }
}

// -------------------------------------------------------------------------------------------------

/// Continuously generates, synthesizes and pushes grains into the shared audio queue, until the
/// shared finished flag gets set.
pub(crate) struct GrainScheduler {
    shared: Arc<SharedState>,
    files: Arc<FileRegistry>,
    config: EngineConfig,
}

impl GrainScheduler {
    pub fn new(shared: Arc<SharedState>, files: Arc<FileRegistry>, config: EngineConfig) -> Self {
        Self {
            shared,
            files,
            config,
        }
    }

    /// Run the scheduler in a new thread. Panics in the thread are logged and finish the engine.
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("grain_scheduler".to_string())
            .spawn(move || {
                let shared = Arc::clone(&self.shared);
                if let Err(payload) = catch_unwind(AssertUnwindSafe(move || self.run())) {
                    let message = panic_message::panic_message(&payload).to_string();
                    shared
                        .log
                        .error(format!("Ouch. Grain scheduler thread panicked: {message}"));
                    shared.finish();
                }
            })
    }

    /// Run the scheduler loop in the calling thread.
    pub fn run(self) {
        let shared = Arc::clone(&self.shared);
        if self.files.is_empty() {
            shared.log.warn("No audio files loaded: nothing to play");
            shared.finish();
            return;
        }

        if self.config.promote_scheduler_thread {
            // Promote the scheduler thread to audio priority to prevent queue under-runs.
            if let Err(err) = audio_thread_priority::promote_current_thread_to_real_time(
                self.config.chunk_frames as u32,
                SAMPLE_RATE,
            ) {
                log::warn!("Failed to set grain scheduler thread's priority to real-time: {err}");
            }
        }

        while !shared.is_finished() {
            let settings = shared.settings_snapshot();
            let params = match shared.rng.lock() {
                Ok(mut rng) => generate_random_grain(&self.files, &settings, &mut *rng),
                Err(_) => None,
            };
            let Some(params) = params else {
                break;
            };
            if !self.play_grain(&params, &settings) {
                thread::sleep(self.config.grain_interval);
                continue;
            }
            if settings.white_noise_ms > 0 && !shared.is_finished() {
                let noise = match shared.noise_rng.lock() {
                    Ok(mut rng) => white_noise(
                        ms_to_frames(settings.white_noise_ms, SAMPLE_RATE),
                        CHANNEL_COUNT,
                        settings.white_noise_amplitude,
                        &mut *rng,
                    ),
                    Err(_) => break,
                };
                self.push_samples(&noise, false);
            }
            thread::sleep(self.config.grain_interval);
        }
        shared.queue.set_finished();
        log::debug!("Grain scheduler stopped");
    }

    /// Synthesize and push a single grain. Returns false when the grain is unavailable.
    fn play_grain(&self, params: &GrainParameters, settings: &GranularSettings) -> bool {
        let Some(entry) = self.files.get(params.file_index) else {
            return false;
        };
        self.shared.monitor.set_last(GrainDebugInfo::new(
            *params,
            entry.relative_path().to_path_buf(),
            entry.sample_rate(),
        ));

        let duration_ms = params.duration_frames as f64 * 1000.0 / SAMPLE_RATE as f64;
        let looping = if params.loop_enabled {
            format!(
                ", loop {} frames, drag {} frames",
                params.loop_window_frames, params.loop_drag_frames
            )
        } else {
            String::new()
        };
        self.shared.log.info(format!(
            "Grain: {} @ {} for {:.0} ms, amp {:.2}{looping}",
            entry.relative_path().display(),
            params.start_frame,
            duration_ms,
            params.amplitude,
        ));

        match read_grain(entry, params, SAMPLE_RATE) {
            Ok(mut samples) => {
                if settings.envelope {
                    apply_hann_envelope(&mut samples, CHANNEL_COUNT);
                }
                self.push_samples(&samples, true);
                true
            }
            Err(err) => {
                self.shared.log.warn(format!(
                    "Failed to read grain from {}: {err}",
                    entry.relative_path().display()
                ));
                false
            }
        }
    }

    /// Push samples in chunks into the queue, waiting for free space as needed.
    /// Gives up and returns false when the engine gets finished while waiting.
    fn push_samples(&self, samples: &[f32], schedule_grain: bool) -> bool {
        let queue = &self.shared.queue;
        let chunk_len = self.config.chunk_frames * CHANNEL_COUNT;
        for (index, chunk) in samples.chunks(chunk_len).enumerate() {
            if schedule_grain && index == 0 {
                let start = Instant::now() + queue.queued_duration();
                let frames = samples.len() / CHANNEL_COUNT;
                let length = Duration::from_secs_f64(frames as f64 / SAMPLE_RATE as f64);
                self.shared.monitor.set_last_schedule(start, start + length);
            }
            let mut pushed = 0;
            while pushed < chunk.len() {
                pushed += queue.push(&chunk[pushed..]);
                if pushed < chunk.len() {
                    if self.shared.is_finished() {
                        return false;
                    }
                    thread::sleep(self.config.push_retry_interval);
                }
            }
        }
        true
    }
}

// -------------------------------------------------------------------------------------------------
