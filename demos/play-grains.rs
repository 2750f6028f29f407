//! An example showcasing how to stream randomized grains from a directory of audio files,
//! monitor the engine and optionally record the output.

use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

use arg::{parse_args, Args};

use grainwalk::{CpalOutput, Engine, EngineConfig, Error, GranularSettings, ScanOptions};

// -------------------------------------------------------------------------------------------------

const DEFAULT_LOG_LEVEL: log::Level = if cfg!(debug_assertions) {
    log::Level::Debug
} else {
    log::Level::Warn
};

const DEFAULT_DURATION_SECS: u64 = 30;

// -------------------------------------------------------------------------------------------------

/// Program arguments of the grain player.
#[derive(Args, Debug, Default)]
struct Arguments {
    #[arg(short = "d", long = "directory")]
    /// Directory to load audio files from.
    directory: Option<PathBuf>,
    #[arg(short = "r", long = "recursive")]
    /// Also load files from sub directories.
    recursive: bool,
    #[arg(short = "e", long = "extension")]
    /// File extension of the files to load. By default \"mp3\".
    extension: Option<String>,
    #[arg(short = "s", long = "seed")]
    /// Seed for the grain generator. By default a random one.
    seed: Option<u64>,
    #[arg(short = "t", long = "time")]
    /// Playback duration in seconds. By default 30.
    time: Option<u64>,
    #[arg(short = "p", long = "loop-probability")]
    /// Probability of looping grains in range 0 to 1.
    loop_probability: Option<f32>,
    #[arg(short = "n", long = "noise")]
    /// Length of white noise bursts between grains in milliseconds.
    noise_ms: Option<usize>,
    #[arg(short = "o", long = "output")]
    /// Record the played audio into the given wav file.
    output_path: Option<PathBuf>,
    #[arg(short = "l", long = "log-level")]
    /// Set logging level to \"debug\", \"info\", \"warn\" or \"error\".
    /// By default \"debug\" in dev builds and \"warn\" in release builds.
    log_level: Option<log::Level>,
}

// -------------------------------------------------------------------------------------------------

fn main() -> Result<(), Error> {
    // Parse optional arguments
    let args = parse_args::<Arguments>();

    // Init logger
    simple_logger::SimpleLogger::new()
        .with_level(args.log_level.unwrap_or(DEFAULT_LOG_LEVEL).to_level_filter())
        // disable logging in chatty modules
        .with_module_level("symphonia_core", log::LevelFilter::Warn)
        .with_module_level("symphonia_format", log::LevelFilter::Warn)
        .with_module_level("symphonia_bundle_mp3", log::LevelFilter::Warn)
        .with_module_level("audio_thread_priority", log::LevelFilter::Warn)
        .init()
        .expect("Failed to set logger");

    let Some(directory) = args.directory.clone() else {
        eprintln!("Missing audio file directory. Pass one via `--directory PATH`.");
        std::process::exit(1);
    };

    // Create the engine and load files
    let mut config = EngineConfig::default();
    if let Some(seed) = args.seed {
        config = config.seed(seed);
    }
    let engine = Engine::new(config)?;

    let mut scan_options = ScanOptions::default().recursive(args.recursive);
    if let Some(extension) = &args.extension {
        scan_options = scan_options.extensions(&[extension]);
    }
    let report = engine.load_directory(&directory, &scan_options)?;
    println!(
        "Loaded {} of {} audio files from '{}'",
        report.files_loaded,
        report.files_attempted,
        directory.display()
    );
    if report.files_loaded == 0 {
        return Ok(());
    }

    // Apply settings
    let mut settings = GranularSettings::default().envelope(true);
    if let Some(probability) = args.loop_probability {
        settings = settings.loop_probability(probability);
    }
    if let Some(noise_ms) = args.noise_ms {
        settings = settings.white_noise(noise_ms, settings.white_noise_amplitude);
    }
    engine.set_settings(settings);

    // Open the audio device, start recording and playback
    let output = CpalOutput::open(engine.output_callback())?;
    if let Some(output_path) = &args.output_path {
        engine.start_recording(output_path)?;
    }
    engine.start()?;

    // Monitor the current grain
    let duration = Duration::from_secs(args.time.unwrap_or(DEFAULT_DURATION_SECS));
    let start = Instant::now();
    let mut last_printed = None;
    while start.elapsed() < duration && !engine.is_finished() {
        if let Some(grain) = engine.current_grain() {
            let key = (grain.file_path.clone(), grain.params.start_frame);
            if last_printed.as_ref() != Some(&key) {
                println!(
                    "Playing '{}' at frame {} ({} frames{})",
                    grain.file_path.display(),
                    grain.params.start_frame,
                    grain.params.duration_frames,
                    if grain.params.loop_enabled {
                        ", looped"
                    } else {
                        ""
                    }
                );
                last_printed = Some(key);
            }
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    // Stop and let the output play what's left in the queue
    engine.stop();
    if !output.wait_until_complete(Duration::from_secs(5)) {
        log::warn!("Audio output did not complete in time");
    }
    if engine.is_recording() {
        let summary = engine.stop_recording()?;
        println!(
            "Recorded {:.1} seconds into '{}'",
            summary.duration.as_secs_f64(),
            summary.path.display()
        );
    }
    Ok(())
}
