use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    StreamConfig,
};
use crossbeam_channel::{bounded, Receiver, Sender};

use crate::{
    error::Error,
    output::{OutputCallback, StreamStatus},
    settings::{CHANNEL_COUNT, SAMPLE_RATE},
};

// -------------------------------------------------------------------------------------------------

const SAMPLE_FORMAT: cpal::SampleFormat = cpal::SampleFormat::F32;
const PREFERRED_BUFFER_SIZE: cpal::BufferSize = cpal::BufferSize::Fixed(256);

// -------------------------------------------------------------------------------------------------

/// Plays an engine's [`OutputCallback`] on the system's default audio output device.
///
/// The device stream lives in its own thread and gets closed when this output drops.
pub struct CpalOutput {
    stream_send: Sender<StreamMsg>,
    completion: Arc<Completion>,
    thread: Option<JoinHandle<()>>,
}

impl CpalOutput {
    /// Open the default output device at 48 kHz stereo and start pulling from `callback`.
    pub fn open(callback: OutputCallback) -> Result<Self, Error> {
        let host = cpal::default_host();

        // Open the default output device.
        let device = host
            .default_output_device()
            .ok_or(cpal::DefaultStreamConfigError::DeviceNotAvailable)?;

        if let Ok(name) = device.name() {
            log::info!("using audio device: {}", name);
        }

        let supported = Self::output_config(&device)?;
        let config = supported.config();

        let (stream_send, stream_recv) = bounded(16);
        let (ready_send, ready_recv) = bounded(1);
        let completion = Arc::new(Completion::new());

        let thread = thread::Builder::new()
            .name("audio_output".to_string())
            .spawn({
                let completion = Arc::clone(&completion);
                move || {
                    let stream = match Stream::open(device, config, callback, completion) {
                        Ok(stream) => stream,
                        Err(err) => {
                            let _ = ready_send.send(Err(err));
                            return;
                        }
                    };
                    let _ = ready_send.send(Ok(()));
                    stream.process_messages(stream_recv);
                }
            })?;

        match ready_recv.recv() {
            Ok(Ok(())) => Ok(Self {
                stream_send,
                completion,
                thread: Some(thread),
            }),
            Ok(Err(err)) => {
                let _ = thread.join();
                Err(err)
            }
            Err(_) => {
                let _ = thread.join();
                Err(Error::OutputDeviceError(
                    "audio output thread died unexpectedly".into(),
                ))
            }
        }
    }

    /// True once the engine finished and the output played everything. Gets reset as soon as
    /// a restarted engine delivers new samples.
    pub fn is_complete(&self) -> bool {
        self.completion.is_complete()
    }

    /// Block until the output played everything, or the timeout elapsed.
    /// Returns true when the output completed.
    pub fn wait_until_complete(&self, timeout: Duration) -> bool {
        self.completion.wait(timeout)
    }

    /// Pause the device stream. The engine keeps on running until its queue is full.
    pub fn pause(&self) {
        self.send_to_stream(StreamMsg::Pause);
    }

    /// Resume a paused device stream.
    pub fn resume(&self) {
        self.send_to_stream(StreamMsg::Resume);
    }

    /// Stop and release the audio device.
    pub fn close(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.send_to_stream(StreamMsg::Close);
            if thread.join().is_err() {
                log::error!("audio output thread panicked");
            }
        }
    }

    fn send_to_stream(&self, msg: StreamMsg) {
        if self.stream_send.send(msg).is_err() {
            log::error!("output stream thread is dead");
        }
    }

    fn output_config(device: &cpal::Device) -> Result<cpal::SupportedStreamConfig, Error> {
        let sample_rate = cpal::SampleRate(SAMPLE_RATE);
        for s in device.supported_output_configs()? {
            let rates = s.min_sample_rate()..=s.max_sample_rate();
            if s.channels() as usize == CHANNEL_COUNT
                && s.sample_format() == SAMPLE_FORMAT
                && rates.contains(&sample_rate)
            {
                return Ok(s.with_sample_rate(sample_rate));
            }
        }
        Err(Error::OutputDeviceError(
            format!("device does not support {SAMPLE_RATE} Hz stereo float output").into(),
        ))
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.close();
    }
}

// -------------------------------------------------------------------------------------------------

enum StreamMsg {
    Pause,
    Resume,
    Close,
}

struct Stream {
    stream: cpal::Stream,
    _device: cpal::Device,
}

impl Stream {
    fn open(
        device: cpal::Device,
        config: StreamConfig,
        callback: OutputCallback,
        completion: Arc<Completion>,
    ) -> Result<Self, Error> {
        let preferred_config = StreamConfig {
            buffer_size: PREFERRED_BUFFER_SIZE,
            ..config.clone()
        };
        let stream = match Self::build(
            &device,
            &preferred_config,
            callback.clone(),
            Arc::clone(&completion),
        ) {
            Ok(stream) => stream,
            Err(err) => {
                log::warn!("failed to open output stream with a fixed buffer size: {err}");
                Self::build(&device, &config, callback, completion)?
            }
        };
        stream.play()?;

        Ok(Self {
            _device: device,
            stream,
        })
    }

    fn build(
        device: &cpal::Device,
        config: &StreamConfig,
        mut callback: OutputCallback,
        completion: Arc<Completion>,
    ) -> Result<cpal::Stream, Error> {
        log::info!("opening output stream: {:?}", config);
        let stream = device.build_output_stream(
            config,
            move |output: &mut [f32], _| {
                completion.update(callback.process(output));
            },
            |err| {
                log::error!("audio output error: {}", err);
            },
            None,
        )?;
        Ok(stream)
    }

    fn process_messages(self, receiver: Receiver<StreamMsg>) {
        // a disconnected channel closes the stream too
        while let Ok(msg) = receiver.recv() {
            match msg {
                StreamMsg::Pause => {
                    log::debug!("pausing audio output stream");
                    if let Err(err) = self.stream.pause() {
                        log::error!("failed to stop stream: {}", err);
                    }
                }
                StreamMsg::Resume => {
                    log::debug!("resuming audio output stream");
                    if let Err(err) = self.stream.play() {
                        log::error!("failed to start stream: {}", err);
                    }
                }
                StreamMsg::Close => break,
            }
        }
        log::debug!("closing audio output stream");
        let _ = self.stream.pause();
    }
}

// -------------------------------------------------------------------------------------------------

/// Completion state of an output stream, set and reset from the audio callback.
struct Completion {
    is_complete: AtomicBool,
    send: Sender<()>,
    recv: Receiver<()>,
}

impl Completion {
    fn new() -> Self {
        let (send, recv) = bounded(1);
        Self {
            is_complete: AtomicBool::new(false),
            send,
            recv,
        }
    }

    fn is_complete(&self) -> bool {
        self.is_complete.load(Ordering::Acquire)
    }

    /// Apply a callback's status. Never blocks.
    fn update(&self, status: StreamStatus) {
        match status {
            StreamStatus::Complete => {
                if !self.is_complete.swap(true, Ordering::AcqRel) {
                    let _ = self.send.try_send(());
                }
            }
            StreamStatus::Continue => {
                if self.is_complete() {
                    self.is_complete.store(false, Ordering::Release);
                }
            }
        }
    }

    fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_complete() {
                return true;
            }
            // notifications of a previous, already reset completion may still be pending
            let remaining = deadline.saturating_duration_since(Instant::now());
            if self.recv.recv_timeout(remaining).is_err() {
                return self.is_complete();
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

impl From<cpal::DefaultStreamConfigError> for Error {
    fn from(err: cpal::DefaultStreamConfigError) -> Error {
        Error::OutputDeviceError(Box::new(err))
    }
}

impl From<cpal::SupportedStreamConfigsError> for Error {
    fn from(err: cpal::SupportedStreamConfigsError) -> Error {
        Error::OutputDeviceError(Box::new(err))
    }
}

impl From<cpal::BuildStreamError> for Error {
    fn from(err: cpal::BuildStreamError) -> Error {
        Error::OutputDeviceError(Box::new(err))
    }
}

impl From<cpal::PlayStreamError> for Error {
    fn from(err: cpal::PlayStreamError) -> Error {
        Error::OutputDeviceError(Box::new(err))
    }
}

// -------------------------------------------------------------------------------------------------
