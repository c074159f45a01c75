//! Error types for the jamming engine

use thiserror::Error;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Provisioning error: {0}")]
    Provision(#[from] ProvisionError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Frequency validation errors
///
/// These are advisory: synthesis never raises them, callers decide whether
/// to abort or carry on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("frequency cannot be negative: {0:.1} Hz")]
    Invalid(f64),

    #[error("frequency {freq:.1} Hz is outside the ultrasonic band ({min:.1}-{max:.1} Hz)")]
    OutOfRange { freq: f64, min: f64, max: f64 },
}

/// Audio endpoint errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("Device not found: {0}")]
    NotFound(String),

    #[error("No default output device")]
    NoDefaultOutput,

    #[error("Device enumeration failed: {0}")]
    Enumeration(String),

    #[error("Device configuration unavailable: {0}")]
    Config(String),
}

/// Loopback device provisioning errors
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Failed to download installer: {0}")]
    Download(String),

    #[error("Failed to write installer to disk: {0}")]
    Write(#[source] std::io::Error),

    #[error("Installer failed: {0}")]
    Installer(String),

    #[error("Automatic installation is not supported: {0}")]
    Unsupported(String),

    #[error("Installation already in progress")]
    InProgress,
}

/// Stream lifecycle errors from the audio I/O layer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StreamError {
    #[error("Failed to open stream: {0}")]
    Open(String),

    #[error("Failed to start stream: {0}")]
    Start(String),

    #[error("Stream runtime error: {0}")]
    Runtime(String),

    #[error("Stream host thread failed: {0}")]
    Thread(String),
}

/// Result type alias for the engine
pub type Result<T> = std::result::Result<T, Error>;
