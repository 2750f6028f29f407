use std::{error, fmt, io};

// -------------------------------------------------------------------------------------------------

/// Provides an enumeration of all possible errors reported by grainwalk.
#[derive(Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    MediaFileNotFound,
    MediaFileProbeError,
    MediaFileSeekError,
    AudioDecodingError(Box<dyn error::Error + Send + Sync>),
    SourceTooShort(usize),
    OutputDeviceError(Box<dyn error::Error + Send + Sync>),
    RecordingError(Box<dyn error::Error + Send + Sync>),
    RecordingAlreadyActive,
    RecordingNotActive,
    EngineRunning,
    ParameterError(String),
    IoError(io::Error),
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MediaFileNotFound => write!(f, "Audio file not found"),
            Self::MediaFileProbeError => write!(f, "Audio file failed to probe"),
            Self::MediaFileSeekError => write!(f, "Audio file failed to seek"),
            Self::AudioDecodingError(err)
            | Self::OutputDeviceError(err)
            | Self::RecordingError(err) => err.fmt(f),
            Self::SourceTooShort(frames) => {
                write!(f, "Audio file only delivered {frames} frame(s) for the grain")
            }
            Self::RecordingAlreadyActive => write!(f, "A recording is already running"),
            Self::RecordingNotActive => write!(f, "No recording is running"),
            Self::EngineRunning => write!(f, "Operation not allowed while the engine is running"),
            Self::ParameterError(str) => write!(f, "Invalid parameter: {str}"),
            Self::IoError(err) => err.fmt(f),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}

impl From<symphonia::core::errors::Error> for Error {
    fn from(err: symphonia::core::errors::Error) -> Error {
        match err {
            symphonia::core::errors::Error::IoError(err) => Error::IoError(err),
            symphonia::core::errors::Error::SeekError(_) => Error::MediaFileSeekError,
            err => Error::AudioDecodingError(Box::new(err)),
        }
    }
}

impl From<hound::Error> for Error {
    fn from(err: hound::Error) -> Error {
        match err {
            hound::Error::IoError(err) => Error::IoError(err),
            err => Error::RecordingError(Box::new(err)),
        }
    }
}
