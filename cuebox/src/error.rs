//! Error types for cuebox
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for cuebox
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid sound configuration (missing source, bad concurrency, etc.)
    ///
    /// Fails fast at construction; fatal to that sound only.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Byte fetch errors (network or file read)
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Audio decoding errors
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Invalid value passed to a setter; state is left unchanged
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using cuebox Error
pub type Result<T> = std::result::Result<T, Error>;
