//! Error types for mouthpiece
//!
//! Each variant carries the user-visible message for its failure class,
//! so callers can surface `Display` output directly.

use thiserror::Error;

/// Result type alias using the mouthpiece error
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The host audio subsystem could not be opened or walked
    #[error("could not enumerate audio devices: {0}")]
    DeviceEnumeration(String),

    /// A previously selected device is no longer resolvable
    #[error("audio device '{0}' is no longer available")]
    DeviceUnavailable(String),

    /// Unreadable or corrupt audio file
    #[error("could not read audio file {path}: {reason}")]
    AudioFormat { path: String, reason: String },

    /// Native stream open failed (device busy, unsupported format)
    #[error("could not open an audio stream on '{device}': {reason}")]
    StreamCreation { device: String, reason: String },

    /// Remote synthesis/transcription/rewrite call failed
    #[error("could not reach the {service} service: {reason}")]
    RemoteService { service: &'static str, reason: String },

    /// Caller-side precondition not met (no device selected, empty text)
    #[error("{0}")]
    Precondition(String),

    /// Settings file could not be read or written
    #[error("settings error: {0}")]
    Settings(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn remote(service: &'static str, err: reqwest::Error) -> Self {
        Error::RemoteService {
            service,
            reason: err.to_string(),
        }
    }
}
