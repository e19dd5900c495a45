//! Shared runtime kernel for the ostinato synthesis engine.
//!
//! Carries the pieces every subsystem needs: the error type, the module
//! configuration, PCM sample conversion and the shared float-buffer pool
//! used by the produce hot path.

pub mod error;
pub use error::{Error, Result};

pub mod config;
pub use config::{Config, DEFAULT_STREAM_BUF_SIZE_THRESHOLD};

pub mod buffer;
pub use buffer::{PooledBuffer, SharedBufferPool};

pub mod sample;
pub use sample::{
    f32_to_sample16, f32_to_sample8, sample16_to_f32, sample8_to_f32, write_pcm, write_silence,
};
