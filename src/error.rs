//! Error types for the kiosk runtime.
//!
//! Nothing in the orchestration core surfaces these to a visitor. They are
//! returned from constructors and logged by the controllers before falling
//! back to an idle or default state.

use thiserror::Error;

pub type KioskResult<T> = Result<T, KioskError>;

#[derive(Error, Debug)]
pub enum KioskError {
    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Unknown track: {0}")]
    TrackNotFound(String),

    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio decode error: {0}")]
    Decode(String),

    #[error("Playback error: {0}")]
    Playback(String),

    #[error("Position store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rodio::StreamError> for KioskError {
    fn from(err: rodio::StreamError) -> Self {
        KioskError::AudioDevice(err.to_string())
    }
}

impl From<rodio::PlayError> for KioskError {
    fn from(err: rodio::PlayError) -> Self {
        KioskError::Playback(err.to_string())
    }
}

impl From<rodio::decoder::DecoderError> for KioskError {
    fn from(err: rodio::decoder::DecoderError) -> Self {
        KioskError::Decode(err.to_string())
    }
}

impl From<sled::Error> for KioskError {
    fn from(err: sled::Error) -> Self {
        KioskError::Store(err.to_string())
    }
}
