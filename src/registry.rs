//! Metadata of all discovered audio files, which are decoded on demand only.

use std::{
    ops::{Deref, DerefMut},
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
};

use walkdir::WalkDir;

use crate::{decoder::AudioDecoder, telemetry::EventLog, Error};

// -------------------------------------------------------------------------------------------------

/// A discovered audio file. Only holds metadata: decoders are opened for a single grain via
/// [`FileEntry::open`] and closed again right after.
#[derive(Debug)]
pub struct FileEntry {
    path: PathBuf,
    relative_path: PathBuf,
    sample_rate: u32,
    channel_count: usize,
    total_frames: u64,
    is_open: AtomicBool,
}

impl FileEntry {
    /// Create a new entry from metadata gathered by some external directory walk.
    pub fn new<P: Into<PathBuf>, R: Into<PathBuf>>(
        path: P,
        relative_path: R,
        sample_rate: u32,
        channel_count: usize,
        total_frames: u64,
    ) -> Self {
        Self {
            path: path.into(),
            relative_path: relative_path.into(),
            sample_rate,
            channel_count,
            total_frames,
            is_open: AtomicBool::new(false),
        }
    }

    /// Create a new entry by briefly opening the file to read its signal specs and length.
    pub fn probe<P: AsRef<Path>>(path: P, root: &Path) -> Result<Self, Error> {
        let path = path.as_ref();
        let mut decoder = AudioDecoder::from_file(path)?;
        let spec = decoder.signal_spec()?;
        let total_frames = decoder.total_frames()?;
        if total_frames == 0 {
            return Err(Error::SourceTooShort(0));
        }
        let relative_path = path.strip_prefix(root).unwrap_or(path);
        Ok(Self::new(
            path,
            relative_path,
            spec.rate,
            spec.channels.count(),
            total_frames,
        ))
    }

    /// Absolute path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }
    /// Path of the file relative to the scanned directory, for display.
    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }
    /// Native sample rate of the file.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
    /// Native channel count of the file.
    pub fn channel_count(&self) -> usize {
        self.channel_count
    }
    /// Total number of frames at the native sample rate. Never changes after discovery.
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// True while a decoder for this file is open.
    pub fn is_open(&self) -> bool {
        self.is_open.load(Ordering::Acquire)
    }

    /// Open a decoder for this file. The decoder gets closed when the returned lease drops.
    pub fn open(&self) -> Result<DecoderLease<'_>, Error> {
        let decoder = AudioDecoder::from_file(&self.path)?;
        self.is_open.store(true, Ordering::Release);
        Ok(DecoderLease {
            entry: self,
            decoder,
        })
    }
}

// -------------------------------------------------------------------------------------------------

/// An open decoder of a [`FileEntry`], which closes on drop.
pub struct DecoderLease<'a> {
    entry: &'a FileEntry,
    decoder: AudioDecoder,
}

impl Deref for DecoderLease<'_> {
    type Target = AudioDecoder;
    fn deref(&self) -> &Self::Target {
        &self.decoder
    }
}

impl DerefMut for DecoderLease<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.decoder
    }
}

impl Drop for DecoderLease<'_> {
    fn drop(&mut self) {
        self.entry.is_open.store(false, Ordering::Release);
    }
}

// -------------------------------------------------------------------------------------------------

/// Options for scanning a directory for audio files.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// By default false. When true, sub directories are scanned too.
    pub recursive: bool,
    /// Lower case file extensions, without a leading dot, of the files to load.
    /// By default "mp3" only.
    pub extensions: Vec<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            recursive: false,
            extensions: vec!["mp3".to_string()],
        }
    }
}

impl ScanOptions {
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn extensions<S: AsRef<str>>(mut self, extensions: &[S]) -> Self {
        self.extensions = extensions
            .iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
    }
}

/// Outcome of a directory scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Number of files with a matching extension.
    pub files_attempted: usize,
    /// Number of files which could be probed successfully.
    pub files_loaded: usize,
}

// -------------------------------------------------------------------------------------------------

/// The pool of audio files grains are picked from.
#[derive(Debug, Default)]
pub struct FileRegistry {
    files: Vec<FileEntry>,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry from entries gathered elsewhere.
    pub fn from_entries(files: Vec<FileEntry>) -> Self {
        Self { files }
    }

    /// Scan the given directory for audio files. Files which fail to load are logged and
    /// skipped. Only a failure to read the root directory itself is returned as error.
    ///
    /// Entries are sorted by path, so a fixed seed produces the same grains for the same
    /// directory.
    pub fn scan<P: AsRef<Path>>(
        directory: P,
        options: &ScanOptions,
        log: &EventLog,
    ) -> Result<(Self, LoadReport), Error> {
        let root = directory.as_ref();
        let mut candidates = Vec::new();
        if let Err(err) = Self::collect_candidates(root, options, log, &mut candidates) {
            log.error(format!(
                "Error reading directory '{}': {err}",
                root.display()
            ));
            return Err(err);
        }
        candidates.sort();

        let mut report = LoadReport {
            files_attempted: candidates.len(),
            files_loaded: 0,
        };
        let mut files = Vec::with_capacity(candidates.len());
        for path in candidates {
            match FileEntry::probe(&path, root) {
                Ok(entry) => {
                    log.info(format!(
                        "Loaded: {} ({} frames, {} Hz, {} ch)",
                        entry.relative_path().display(),
                        entry.total_frames(),
                        entry.sample_rate(),
                        entry.channel_count()
                    ));
                    files.push(entry);
                }
                Err(err) => {
                    log.warn(format!("Failed to load: {} ({err})", path.display()));
                }
            }
        }
        report.files_loaded = files.len();
        log.info(format!(
            "Loaded {} of {} audio files from '{}'",
            report.files_loaded,
            report.files_attempted,
            root.display()
        ));
        Ok((Self { files }, report))
    }

    fn collect_candidates(
        root: &Path,
        options: &ScanOptions,
        log: &EventLog,
        candidates: &mut Vec<PathBuf>,
    ) -> Result<(), Error> {
        // directory links are not followed, so link cycles can't register files twice
        let max_depth = if options.recursive { usize::MAX } else { 1 };
        for entry in WalkDir::new(root).max_depth(max_depth) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if err.depth() == 0 => {
                    return Err(Error::IoError(err.into()));
                }
                Err(err) => {
                    let path = err.path().unwrap_or(root).to_path_buf();
                    log.warn(format!("Skipping '{}': {err}", path.display()));
                    continue;
                }
            };
            if entry.depth() == 0 {
                if !entry.file_type().is_dir() {
                    return Err(Error::ParameterError(format!(
                        "'{}' is not a directory",
                        root.display()
                    )));
                }
                continue;
            }
            let path = entry.path();
            // file links are resolved, like regular files
            let is_file = entry.file_type().is_file()
                || (entry.path_is_symlink() && path.is_file());
            if is_file && options.matches(path) {
                candidates.push(entry.into_path());
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FileEntry> {
        self.files.get(index)
    }

    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, frames: usize, sample_rate: u32, channels: u16) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..frames * channels as usize {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn extension_matching() {
        let options = ScanOptions::default();
        assert!(options.matches(Path::new("a/b.mp3")));
        assert!(options.matches(Path::new("a/b.MP3")));
        assert!(!options.matches(Path::new("a/b.wav")));
        assert!(!options.matches(Path::new("a/mp3")));

        let options = ScanOptions::default().extensions(&[".WAV", "flac"]);
        assert!(options.matches(Path::new("b.wav")));
        assert!(options.matches(Path::new("b.Flac")));
    }

    #[test]
    fn scan_directory() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("b.wav"), 1000, 44100, 2);
        write_wav(&dir.path().join("a.wav"), 500, 22050, 1);
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        write_wav(&dir.path().join("sub").join("c.wav"), 200, 48000, 2);

        let log = EventLog::default();
        let options = ScanOptions::default().extensions(&["wav"]);
        let (registry, report) = FileRegistry::scan(dir.path(), &options, &log).unwrap();
        assert_eq!(
            report,
            LoadReport {
                files_attempted: 2,
                files_loaded: 2
            }
        );
        assert_eq!(registry.len(), 2);
        let first = registry.get(0).unwrap();
        assert_eq!(first.relative_path(), Path::new("a.wav"));
        assert_eq!(first.sample_rate(), 22050);
        assert_eq!(first.channel_count(), 1);
        assert_eq!(first.total_frames(), 500);
        assert!(!first.is_open());

        let (registry, report) =
            FileRegistry::scan(dir.path(), &options.clone().recursive(true), &log).unwrap();
        assert_eq!(report.files_loaded, 3);
        assert_eq!(
            registry.get(2).unwrap().relative_path(),
            Path::new("sub").join("c.wav")
        );
    }

    #[cfg(unix)]
    #[test]
    fn scan_ignores_directory_link_cycles() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("a.wav"), 100, 44100, 2);
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        write_wav(&dir.path().join("sub").join("b.wav"), 100, 44100, 2);
        std::os::unix::fs::symlink(dir.path(), dir.path().join("sub").join("parent")).unwrap();
        std::os::unix::fs::symlink(".", dir.path().join("self")).unwrap();
        // links to files are loaded like regular files
        std::os::unix::fs::symlink(dir.path().join("a.wav"), dir.path().join("c.wav")).unwrap();

        let log = EventLog::default();
        let options = ScanOptions::default().extensions(&["wav"]).recursive(true);
        let (registry, report) = FileRegistry::scan(dir.path(), &options, &log).unwrap();
        assert_eq!(
            report,
            LoadReport {
                files_attempted: 3,
                files_loaded: 3
            }
        );
        let paths = registry
            .files()
            .iter()
            .map(|file| file.relative_path().to_path_buf())
            .collect::<Vec<_>>();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("a.wav"),
                PathBuf::from("c.wav"),
                Path::new("sub").join("b.wav")
            ]
        );
    }

    #[test]
    fn scan_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::default();
        let result = FileRegistry::scan(dir.path().join("missing"), &ScanOptions::default(), &log);
        assert!(result.is_err());
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn decoder_lease_closes_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        write_wav(&path, 100, 44100, 1);
        let entry = FileEntry::probe(&path, dir.path()).unwrap();
        {
            let lease = entry.open().unwrap();
            assert!(entry.is_open());
            assert_eq!(lease.signal_spec().unwrap().rate, 44100);
        }
        assert!(!entry.is_open());
    }

    #[test]
    fn empty_files_fail_to_probe() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        write_wav(&path, 0, 44100, 1);
        assert!(FileEntry::probe(&path, dir.path()).is_err());
    }
}
