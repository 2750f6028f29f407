//! The granular engine: owns files, settings, queue and recorder and runs the grain scheduler.

use std::{
    path::Path,
    sync::{atomic::Ordering, Arc, Mutex},
    thread::JoinHandle,
    time::Instant,
};

use crate::{
    output::OutputCallback,
    queue::AudioQueue,
    recorder::{Recorder, RecordingSummary},
    registry::{FileRegistry, LoadReport, ScanOptions},
    scheduler::{GrainScheduler, SharedState},
    settings::{EngineConfig, GranularSettings},
    telemetry::GrainDebugInfo,
    Error,
};

// -------------------------------------------------------------------------------------------------

/// Run state of an [`Engine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum EngineState {
    Stopped,
    Running,
}

// -------------------------------------------------------------------------------------------------

/// Real-time granular synthesizer engine.
///
/// The engine continuously streams randomized grains from a pool of audio files into an
/// [`AudioQueue`], which gets drained by an audio device via an [`OutputCallback`]. All
/// methods take `&self`, so an engine can be shared between a control and an audio thread.
///
/// ```no_run
/// use grainwalk::{Engine, EngineConfig, ScanOptions};
///
/// let engine = Engine::new(EngineConfig::default())?;
/// engine.load_directory("path/to/mp3s", &ScanOptions::default().recursive(true))?;
/// engine.update_settings(|settings| settings.loop_probability = 0.3);
/// engine.start()?;
/// // feed `engine.output_callback()` into an audio device...
/// engine.stop();
/// # Ok::<(), grainwalk::Error>(())
/// ```
pub struct Engine {
    config: EngineConfig,
    shared: Arc<SharedState>,
    files: Mutex<Arc<FileRegistry>>,
    recorder: Arc<Recorder>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Create a new, stopped engine without any files.
    pub fn new(config: EngineConfig) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            config,
            shared: Arc::new(SharedState::new(&config)),
            files: Mutex::new(Arc::new(FileRegistry::new())),
            recorder: Arc::new(Recorder::new()),
            scheduler: Mutex::new(None),
        })
    }

    /// The engine's construction time config.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Replace the file pool with the audio files of the given directory.
    /// Not allowed while the engine is running.
    pub fn load_directory<P: AsRef<Path>>(
        &self,
        directory: P,
        options: &ScanOptions,
    ) -> Result<LoadReport, Error> {
        if self.is_running() {
            return Err(Error::EngineRunning);
        }
        let (files, report) = FileRegistry::scan(directory, options, &self.shared.log)?;
        self.set_files(files)?;
        Ok(report)
    }

    /// Replace the file pool with externally discovered files.
    /// Not allowed while the engine is running.
    pub fn set_files(&self, files: FileRegistry) -> Result<(), Error> {
        if self.is_running() {
            return Err(Error::EngineRunning);
        }
        let mut current = self
            .files
            .lock()
            .map_err(|_| Error::ParameterError("file registry lock is poisoned".to_string()))?;
        *current = Arc::new(files);
        Ok(())
    }

    /// Number of files in the current file pool.
    pub fn file_count(&self) -> usize {
        self.files.lock().map(|files| files.len()).unwrap_or(0)
    }

    pub fn state(&self) -> EngineState {
        if self.is_running() {
            EngineState::Running
        } else {
            EngineState::Stopped
        }
    }

    /// True while the grain scheduler is running.
    pub fn is_running(&self) -> bool {
        !self.shared.is_finished()
            && self
                .scheduler
                .lock()
                .map(|scheduler| scheduler.as_ref().is_some_and(|t| !t.is_finished()))
                .unwrap_or(false)
    }

    /// True when the engine got stopped or ran out of files. Once finished, the output
    /// completes as soon as the queue is drained.
    pub fn is_finished(&self) -> bool {
        self.shared.is_finished()
    }

    /// Start generating grains. Any remains of a previous run get dropped from the queue.
    pub fn start(&self) -> Result<(), Error> {
        let mut scheduler = self
            .scheduler
            .lock()
            .map_err(|_| Error::ParameterError("scheduler lock is poisoned".to_string()))?;
        if let Some(thread) = scheduler.take() {
            if !self.shared.is_finished() && !thread.is_finished() {
                *scheduler = Some(thread);
                return Err(Error::EngineRunning);
            }
            Self::join_scheduler(thread);
        }

        let files = self
            .files
            .lock()
            .map(|files| Arc::clone(&files))
            .unwrap_or_default();
        self.shared.queue.clear();
        self.shared.monitor.clear();
        self.shared.finished.store(false, Ordering::Release);
        self.shared.log.info(format!(
            "Starting granular engine with {} audio file(s)",
            files.len()
        ));

        let thread = GrainScheduler::new(Arc::clone(&self.shared), files, self.config)
            .spawn()
            .inspect_err(|err| {
                self.shared
                    .log
                    .error(format!("Failed to spawn grain scheduler: {err}"));
                self.shared.finish();
            })?;
        *scheduler = Some(thread);
        Ok(())
    }

    /// Stop generating grains and wait for the scheduler to exit. Already queued samples
    /// stay in the queue, so the output may drain them.
    pub fn stop(&self) {
        let was_running = self.is_running();
        self.shared.finish();
        let thread = self
            .scheduler
            .lock()
            .ok()
            .and_then(|mut scheduler| scheduler.take());
        if let Some(thread) = thread {
            Self::join_scheduler(thread);
        }
        if was_running {
            self.shared.log.info("Stopped granular engine");
        }
    }

    fn join_scheduler(thread: JoinHandle<()>) {
        if thread.join().is_err() {
            log::error!("Failed to join grain scheduler thread");
        }
    }

    /// Copy of the current, possibly not yet sanitized settings.
    pub fn settings(&self) -> GranularSettings {
        self.shared
            .settings
            .lock()
            .map(|settings| *settings)
            .unwrap_or_default()
    }

    /// Replace all settings. Applied with the next grain.
    pub fn set_settings(&self, settings: GranularSettings) {
        self.update_settings(|current| *current = settings);
    }

    /// Modify settings in place. Applied with the next grain.
    pub fn update_settings<F: FnOnce(&mut GranularSettings)>(&self, update: F) {
        match self.shared.settings.lock() {
            Ok(mut settings) => update(&mut settings),
            Err(poisoned) => update(&mut poisoned.into_inner()),
        }
    }

    /// The queue the scheduler pushes samples into.
    pub fn queue(&self) -> Arc<AudioQueue> {
        Arc::clone(&self.shared.queue)
    }

    /// A new callback to pull the engine's output from an audio device.
    pub fn output_callback(&self) -> OutputCallback {
        OutputCallback::new(self.queue(), Arc::clone(&self.recorder))
    }

    /// Start recording the output, as pulled by the output callback, into a WAV file.
    pub fn start_recording<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let path = path.as_ref();
        match self.recorder.start(path) {
            Ok(()) => {
                self.shared
                    .log
                    .info(format!("Recording to '{}'", path.display()));
                Ok(())
            }
            Err(err) => {
                self.shared.log.error(format!(
                    "Failed to start recording '{}': {err}",
                    path.display()
                ));
                Err(err)
            }
        }
    }

    /// Stop recording and finalize the recorded file.
    pub fn stop_recording(&self) -> Result<RecordingSummary, Error> {
        let summary = self.recorder.stop()?;
        self.shared.log.info(format!(
            "Saved recording '{}' ({:.1} s)",
            summary.path.display(),
            summary.duration.as_secs_f64()
        ));
        Ok(summary)
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_active()
    }

    /// Debug info of the most recently scheduled grain.
    pub fn last_grain(&self) -> Option<GrainDebugInfo> {
        self.shared.monitor.last()
    }

    /// Debug info of the grain which presumably is audible right now.
    pub fn current_grain(&self) -> Option<GrainDebugInfo> {
        self.shared.monitor.current(Instant::now())
    }

    /// Copy of the engine's status log, oldest lines first.
    pub fn log_lines(&self) -> Vec<String> {
        self.shared.log.lines()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
        if self.recorder.is_active() {
            if let Err(err) = self.recorder.stop() {
                log::error!("Failed to finalize recording: {err}");
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use super::*;
    use crate::registry::FileEntry;

    fn config() -> EngineConfig {
        EngineConfig::default()
            .seed(1)
            .promote_scheduler_thread(false)
    }

    #[test]
    fn invalid_config() {
        assert!(Engine::new(EngineConfig::default().queue_capacity(3)).is_err());
    }

    #[test]
    fn settings_access() {
        let engine = Engine::new(config()).unwrap();
        assert_eq!(engine.settings(), GranularSettings::default());
        engine.update_settings(|settings| {
            settings.min_grain_ms = 2000;
            settings.max_grain_ms = 10;
        });
        // stored as written, sanitized when read by the scheduler
        assert_eq!(engine.settings().min_grain_ms, 2000);
        engine.set_settings(GranularSettings::default().envelope(true));
        assert!(engine.settings().envelope);
    }

    #[test]
    fn empty_pool_finishes() {
        let engine = Engine::new(config()).unwrap();
        assert_eq!(engine.state(), EngineState::Stopped);
        assert!(engine.is_finished());
        engine.start().unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !engine.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(engine.is_finished());
        assert!(engine.queue().is_finished());
        assert!(!engine.is_running());
        // may be restarted after finishing
        engine.start().unwrap();
        engine.stop();
        assert_eq!(engine.state(), EngineState::Stopped);
    }

    #[test]
    fn files_are_locked_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::new(config()).unwrap();
        // a missing file can't be read, so the scheduler keeps on trying
        engine
            .set_files(FileRegistry::from_entries(vec![FileEntry::new(
                dir.path().join("gone.mp3"),
                "gone.mp3",
                44100,
                2,
                44100 * 10,
            )]))
            .unwrap();
        assert_eq!(engine.file_count(), 1);

        engine.start().unwrap();
        assert!(engine.is_running());
        assert_eq!(engine.state(), EngineState::Running);
        assert!(matches!(engine.start(), Err(Error::EngineRunning)));
        assert!(matches!(
            engine.set_files(FileRegistry::new()),
            Err(Error::EngineRunning)
        ));
        assert!(matches!(
            engine.load_directory(dir.path(), &ScanOptions::default()),
            Err(Error::EngineRunning)
        ));
        engine.stop();
        assert!(!engine.is_running());
        assert!(engine.set_files(FileRegistry::new()).is_ok());
        assert_eq!(engine.file_count(), 0);
    }
}
