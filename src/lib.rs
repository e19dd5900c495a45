//! # Ostinato - Modular Audio Synthesis Engine
//!
//! A data-flow synthesis core: declarative synthesizer definitions
//! (sources, effects, controllers, links) compile into compact runtime
//! graphs, and voice instances produce PCM buffers of any length at any
//! timeline offset on demand from the host's audio thread.
//!
//! ## Architecture
//!
//! Ostinato is an umbrella crate coordinating:
//! - **ostinato-core** - errors, configuration, PCM formats, the shared
//!   float-buffer pool
//! - **ostinato-sound** - sound assets, the decoded-sample interface,
//!   the on-disk sound cache
//! - **ostinato-synth** - curves, links, controllers, sources, effects,
//!   synthesizer definitions and voice instances
//!
//! ## Quick Start
//!
//! ```ignore
//! use ostinato::prelude::*;
//!
//! let system = OstinatoSystem::builder().build()?;
//!
//! let synthesizer = system.create_synthesizer();
//! synthesizer.set_sources(vec![SourceDef::Wave(WaveDef::default())]);
//!
//! let instance = system.create_synthesizer_instance(Some(synthesizer));
//! let mut buffer = vec![0u8; 1024 * instance.generate_sample_size()];
//! instance.produce(&mut buffer, 0, 1024)?;
//! ```

/// Re-export of ostinato-core for direct access.
pub use ostinato_core as core;

/// Re-export of ostinato-sound for direct access.
pub use ostinato_sound as sound;

/// Re-export of ostinato-synth for direct access.
pub use ostinato_synth as synth;

pub use ostinato_core::{Config, Error, PooledBuffer, Result, SharedBufferPool};

pub use ostinato_sound::{
    DecoderFactory, PcmData, SoundAsset, SoundCache, SoundDecoder, SoundEnvironment, SoundInfo,
    WavDecoderFactory,
};

pub use ostinato_synth::{
    ChainDef, ControllerDef, Curve, CurveBezier, CurveInterpolation, CurvePoint, EffectDef,
    GroupApplication, GroupDef, LinkDef, MixMode, SoundDef, SourceCommonDef, SourceDef, StretchDef,
    SubSynthDef, Synthesizer, SynthesizerDesc, SynthesizerInstance, TargetDef, TimeStretcher,
    WaveDef, WaveType,
};

mod system;
pub use system::{OstinatoSystem, OstinatoSystemBuilder, ParameterInfo};

/// Everything most hosts need.
pub mod prelude {
    pub use crate::system::{OstinatoSystem, OstinatoSystemBuilder};
    pub use ostinato_core::{Config, Error, Result, SharedBufferPool};
    pub use ostinato_sound::{PcmData, SoundAsset, SoundInfo};
    pub use ostinato_synth::{
        ChainDef, ControllerDef, CurveBezier, CurveInterpolation, CurvePoint, EffectDef,
        GroupApplication, GroupDef, LinkDef, MixMode, SoundDef, SourceCommonDef, SourceDef,
        StretchDef, SubSynthDef, Synthesizer, SynthesizerDesc, SynthesizerInstance, TargetDef,
        WaveDef, WaveType,
    };
}
