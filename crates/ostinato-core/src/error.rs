//! Error types for the ostinato crates.

use thiserror::Error;

/// Error type shared by every ostinato subsystem.
///
/// Produce-path operations only ever fail with [`Error::InvalidArgument`]
/// (impossible buffer sizes) or [`Error::ResourceExhausted`] (a pool claim
/// could not allocate). Everything else belongs to prepare-time paths on the
/// control thread.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Corrupt cache: {0}")]
    CorruptCache(String),

    #[error("Decode failure: {0}")]
    DecodeFailure(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
