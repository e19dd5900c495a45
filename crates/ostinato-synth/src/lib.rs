//! Synthesis graph for the ostinato engine.
//!
//! Compiles declarative synthesizer definitions (sources, effects,
//! controllers, links) into compact runtime graphs and produces PCM
//! buffers of any length at any timeline offset, deterministically and
//! without allocating on the hot path beyond the shared buffer pool.
//!
//! ```ignore
//! let synthesizer = Arc::new(Synthesizer::new());
//! synthesizer.set_sources(vec![SourceDef::Wave(WaveDef::default())]);
//!
//! let instance = SynthesizerInstance::with_synthesizer(pool, synthesizer);
//! instance.produce(&mut buffer, 0, 1024)?;
//! ```

pub mod curve;
pub use curve::{Curve, CurveBezier, CurveInterpolation, CurvePoint};

pub mod controller;
pub use controller::ControllerDef;

pub mod link;
pub use link::LinkDef;

pub mod target;
pub use target::TargetDef;

pub mod def;
pub use def::{
    ChainDef, EffectDef, GroupApplication, GroupDef, MixMode, SoundDef, SourceCommonDef,
    SourceDef, StretchDef, SubSynthDef, SynthesizerDesc, WaveDef, WaveType,
};

pub mod vocoder;
pub use vocoder::TimeStretcher;

pub mod synthesizer;
pub use synthesizer::Synthesizer;

pub mod instance;
pub use instance::SynthesizerInstance;

pub(crate) mod effect;
pub(crate) mod render;
pub(crate) mod source;
pub(crate) mod state;

pub use ostinato_core::{Error, Result};
