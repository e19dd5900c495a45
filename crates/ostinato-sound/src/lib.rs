//! Sound assets for the ostinato synthesis engine.
//!
//! Turns host sound resources into shared, reference-counted PCM the
//! synthesizer sources can read: a decoded-sample interface with a
//! WAV-backed default, an in-memory asset with a streaming cutoff, and a
//! validating on-disk cache keyed by asset path.

pub mod decode;
pub use decode::{DecodeBuffer, DecoderFactory, SoundDecoder, WavDecoder, WavDecoderFactory};

pub mod asset;
pub use asset::{PcmData, SoundAsset, SoundEnvironment, SoundInfo};

pub mod cache;
pub use cache::{CacheEntry, SoundCache};

pub use ostinato_core::{Error, Result};
