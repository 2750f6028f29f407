use std::{
    fs,
    io::Cursor,
    path::Path,
    thread,
    time::{Duration, Instant},
};

use byteorder::{LittleEndian, ReadBytesExt};

use grainwalk::{
    Engine, EngineConfig, GranularSettings, ScanOptions, StreamStatus, CHANNEL_COUNT, SAMPLE_RATE,
};

// -------------------------------------------------------------------------------------------------

fn write_sine_wav(path: &Path, sample_rate: u32, channels: u16, seconds: f32) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let frames = (sample_rate as f32 * seconds) as usize;
    for frame in 0..frames {
        let phase = frame as f32 * 440.0 / sample_rate as f32;
        let value = ((phase * std::f32::consts::TAU).sin() * 20000.0) as i16;
        for _ in 0..channels {
            writer.write_sample(value).unwrap();
        }
    }
    writer.finalize().unwrap();
}

fn wav_options() -> ScanOptions {
    ScanOptions::default().extensions(&["wav"])
}

fn test_config(seed: u64) -> EngineConfig {
    EngineConfig::default()
        .seed(seed)
        .grain_interval(Duration::from_millis(1))
        .promote_scheduler_thread(false)
}

// -------------------------------------------------------------------------------------------------

#[test]
fn load_skips_broken_files() {
    let dir = tempfile::tempdir().unwrap();
    write_sine_wav(&dir.path().join("good.wav"), 44100, 2, 0.5);
    fs::write(dir.path().join("broken.wav"), b"definitely not a wav file").unwrap();

    let engine = Engine::new(test_config(1)).unwrap();
    let report = engine.load_directory(dir.path(), &wav_options()).unwrap();
    assert_eq!(report.files_attempted, 2);
    assert_eq!(report.files_loaded, 1);
    assert_eq!(engine.file_count(), 1);

    let lines = engine.log_lines();
    assert!(lines.iter().any(|line| line.contains("broken.wav")));
    assert!(lines.iter().any(|line| line.contains("good.wav")));

    assert!(engine
        .load_directory(dir.path().join("missing"), &wav_options())
        .is_err());
    // a failed scan keeps the previous files
    assert_eq!(engine.file_count(), 1);
}

#[test]
fn recording_silence() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("silence.wav");

    let engine = Engine::new(test_config(1)).unwrap();
    let queue = engine.queue();
    let mut callback = engine.output_callback();

    engine.start_recording(&path).unwrap();
    assert!(engine.is_recording());
    assert!(engine.start_recording(dir.path().join("other.wav")).is_err());

    // push one second of silence through the output
    let mut buffer = vec![0.0; 256 * CHANNEL_COUNT];
    let mut pushed_frames = 0;
    while pushed_frames < SAMPLE_RATE as usize {
        let frames = 256.min(SAMPLE_RATE as usize - pushed_frames);
        assert_eq!(
            queue.push(&vec![0.0; frames * CHANNEL_COUNT]),
            frames * CHANNEL_COUNT
        );
        callback.process(&mut buffer);
        pushed_frames += frames;
    }
    // starving output does not record zero-filled samples
    callback.process(&mut buffer);

    let summary = engine.stop_recording().unwrap();
    assert!(!engine.is_recording());
    assert_eq!(summary.data_bytes, 192_000);
    assert_eq!(summary.duration, Duration::from_secs(1));

    let bytes = fs::read(&path).unwrap();
    assert_eq!(bytes.len(), 192_000 + 44);
    let mut header = Cursor::new(&bytes[..]);
    header.set_position(4);
    assert_eq!(
        header.read_u32::<LittleEndian>().unwrap(),
        bytes.len() as u32 - 8
    );
    header.set_position(40);
    assert_eq!(header.read_u32::<LittleEndian>().unwrap(), 192_000);
}

#[test]
fn play_grains_until_stopped() {
    let dir = tempfile::tempdir().unwrap();
    write_sine_wav(&dir.path().join("a.wav"), 44100, 2, 1.0);
    write_sine_wav(&dir.path().join("b.wav"), 22050, 1, 1.0);

    let engine = Engine::new(test_config(7)).unwrap();
    engine.load_directory(dir.path(), &wav_options()).unwrap();
    engine.set_settings(
        GranularSettings::default()
            .grain_duration_ms(20, 80)
            .loop_probability(0.5)
            .loop_window_ms(5, 20)
            .white_noise(5, 0.05)
            .envelope(true),
    );
    engine.start().unwrap();
    assert!(engine.is_running());

    // pull half a second of audio like an audio device would
    let mut callback = engine.output_callback();
    let mut buffer = vec![0.0; 256 * CHANNEL_COUNT];
    let mut peak = 0.0f32;
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut pulled_frames = 0;
    while pulled_frames < SAMPLE_RATE as usize / 2 && Instant::now() < deadline {
        if engine.queue().len() < buffer.len() {
            thread::sleep(Duration::from_millis(1));
            continue;
        }
        assert_eq!(callback.process(&mut buffer), StreamStatus::Continue);
        peak = buffer.iter().fold(peak, |peak, s| peak.max(s.abs()));
        pulled_frames += 256;
    }
    assert!(pulled_frames >= SAMPLE_RATE as usize / 2);
    assert!(peak > 0.0 && peak <= 0.7);

    let last = engine.last_grain().unwrap();
    assert!(last.params.file_index < 2);
    assert!(last.expected_start.is_some());
    assert!(engine
        .log_lines()
        .iter()
        .any(|line| line.starts_with("Grain: ")));

    engine.stop();
    assert!(engine.is_finished());
    assert!(!engine.is_running());

    // drain, then complete
    let mut status = StreamStatus::Continue;
    for _ in 0..10_000 {
        status = callback.process(&mut buffer);
        if status == StreamStatus::Complete {
            break;
        }
    }
    assert_eq!(status, StreamStatus::Complete);
    assert!(engine.queue().is_empty());
}
