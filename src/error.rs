//! Error types for the edge voice client

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio path errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Audio path not configured")]
    NotConfigured,

    #[error("Timed out waiting for the audio path lock")]
    PathBusy,

    #[error("Read timed out after {0} ms")]
    ReadTimeout(u64),

    #[error("Short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),
}

/// Link errors
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Link is not connected")]
    NotConnected,

    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Send timed out")]
    SendTimeout,

    #[error("No server endpoint could be resolved")]
    NoEndpoint,
}

/// Camera errors
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Camera init failed: {0}")]
    InitFailed(String),

    #[error("Frame capture failed: {0}")]
    CaptureFailed(String),

    #[error("No camera device available")]
    NotSupported,

    #[error("Image upload failed: {0}")]
    UploadFailed(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(String),

    #[error("Failed to parse config file: {0}")]
    Parse(String),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
