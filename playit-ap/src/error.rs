//! Error types for playit-ap
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for playit-ap
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Media engine errors (unsupported source, engine thread failure)
    #[error("Engine error: {0}")]
    Engine(String),

    /// Effects processor construction or parameter errors
    #[error("Effects error: {0}")]
    Effects(String),

    /// Session host or handle errors
    #[error("Session error: {0}")]
    Session(String),

    /// The session host has been torn down
    #[error("Session released")]
    SessionReleased,

    /// Settings persistence errors
    #[error("Settings error: {0}")]
    Settings(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from the shared library
    #[error(transparent)]
    Common(#[from] playit_common::Error),
}

/// Convenience Result type using playit-ap Error
pub type Result<T> = std::result::Result<T, Error>;
