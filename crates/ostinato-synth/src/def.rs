//! Declaration types: the host-facing description of a synthesizer graph.
//!
//! Declarations are plain data owned by a [`Synthesizer`]; `prepare`
//! compiles them into the runtime arrays. Sub-synthesizers reference other
//! synthesizer definitions, sound sources reference shared sound assets.

use crate::controller::ControllerDef;
use crate::link::LinkDef;
use crate::synthesizer::Synthesizer;
use crate::target::TargetDef;
use ostinato_sound::SoundAsset;
use std::sync::Arc;

/// How a source's output combines with the accumulating mix buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MixMode {
    /// Sum onto the buffer.
    #[default]
    Add,
    /// Linear interpolation weighted by the blend-factor target.
    Blend,
}

/// Waveform of a wave source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaveType {
    #[default]
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

/// How a group source applies its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupApplication {
    /// Sum all children.
    #[default]
    All,
    /// Blend between the two children straddling the select scalar.
    Select,
    /// Play exactly one child picked by the select scalar.
    Solo,
}

/// Fields shared by every source declaration.
#[derive(Clone)]
pub struct SourceCommonDef {
    pub enabled: bool,
    pub mix_mode: MixMode,
    pub min_volume: f32,
    pub max_volume: f32,
    pub min_panning: f32,
    pub max_panning: f32,
    pub target_blend_factor: TargetDef,
    pub target_volume: TargetDef,
    pub target_panning: TargetDef,
    pub effects: Vec<EffectDef>,
}

impl Default for SourceCommonDef {
    fn default() -> Self {
        Self {
            enabled: true,
            mix_mode: MixMode::Add,
            min_volume: 1.0,
            max_volume: 1.0,
            min_panning: 0.0,
            max_panning: 0.0,
            target_blend_factor: TargetDef::default(),
            target_volume: TargetDef::default(),
            target_panning: TargetDef::default(),
            effects: Vec::new(),
        }
    }
}

/// A declared signal generator.
#[derive(Clone)]
pub enum SourceDef {
    Wave(WaveDef),
    Sound(SoundDef),
    Chain(ChainDef),
    Group(GroupDef),
    SubSynth(SubSynthDef),
}

/// Periodic waveform generator.
#[derive(Clone)]
pub struct WaveDef {
    pub common: SourceCommonDef,
    pub wave_type: WaveType,
    pub min_frequency: f32,
    pub max_frequency: f32,
    pub target_frequency: TargetDef,
}

impl Default for WaveDef {
    fn default() -> Self {
        Self {
            common: SourceCommonDef::default(),
            wave_type: WaveType::Sine,
            min_frequency: 440.0,
            max_frequency: 440.0,
            target_frequency: TargetDef::default(),
        }
    }
}

/// Sampled one-shot or loop.
#[derive(Clone)]
pub struct SoundDef {
    pub common: SourceCommonDef,
    pub sound: Option<Arc<SoundAsset>>,
    pub looping: bool,
    pub min_speed: f32,
    pub max_speed: f32,
    pub target_speed: TargetDef,
    pub target_play: TargetDef,
}

impl Default for SoundDef {
    fn default() -> Self {
        Self {
            common: SourceCommonDef::default(),
            sound: None,
            looping: false,
            min_speed: 1.0,
            max_speed: 1.0,
            target_speed: TargetDef::default(),
            target_play: TargetDef::default(),
        }
    }
}

/// Ordered chain of one-shots picked by the select target.
#[derive(Clone)]
pub struct ChainDef {
    pub common: SourceCommonDef,
    pub sounds: Vec<Arc<SoundAsset>>,
    pub min_speed: f32,
    pub max_speed: f32,
    pub target_speed: TargetDef,
    pub target_select: TargetDef,
    pub target_play: TargetDef,
}

impl Default for ChainDef {
    fn default() -> Self {
        Self {
            common: SourceCommonDef::default(),
            sounds: Vec::new(),
            min_speed: 1.0,
            max_speed: 1.0,
            target_speed: TargetDef::default(),
            target_select: TargetDef::default(),
            target_play: TargetDef::default(),
        }
    }
}

/// Grouped child sources.
#[derive(Clone, Default)]
pub struct GroupDef {
    pub common: SourceCommonDef,
    pub application: GroupApplication,
    pub sources: Vec<SourceDef>,
    pub target_select: TargetDef,
}

/// A nested synthesizer definition inlined into the parent.
///
/// `connections[i]` names the parent controller driving child controller
/// `i`, or -1 for none.
#[derive(Clone, Default)]
pub struct SubSynthDef {
    pub common: SourceCommonDef,
    pub synthesizer: Option<Arc<Synthesizer>>,
    pub connections: Vec<i32>,
}

/// A declared signal transformer attached to a source.
#[derive(Clone)]
pub enum EffectDef {
    Stretch(StretchDef),
}

/// Time-stretch and pitch-shift effect. The strength target is declared
/// for every effect kind; stretch derives its behavior from the time and
/// pitch targets alone.
#[derive(Clone)]
pub struct StretchDef {
    pub enabled: bool,
    pub min_time: f32,
    pub max_time: f32,
    pub min_pitch: f32,
    pub max_pitch: f32,
    pub target_strength: TargetDef,
    pub target_time: TargetDef,
    pub target_pitch: TargetDef,
}

impl Default for StretchDef {
    fn default() -> Self {
        Self {
            enabled: true,
            min_time: 0.0,
            max_time: 0.0,
            min_pitch: 0.0,
            max_pitch: 0.0,
            target_strength: TargetDef::default(),
            target_time: TargetDef::default(),
            target_pitch: TargetDef::default(),
        }
    }
}

impl EffectDef {
    pub fn enabled(&self) -> bool {
        match self {
            EffectDef::Stretch(def) => def.enabled,
        }
    }
}

/// The full declared graph of one synthesizer.
#[derive(Clone)]
pub struct SynthesizerDesc {
    /// 1 or 2.
    pub channel_count: u32,
    pub sample_rate: u32,
    /// 1 or 2.
    pub bytes_per_sample: u32,
    /// Nominal play length in samples.
    pub sample_count: u64,
    pub controllers: Vec<ControllerDef>,
    pub links: Vec<LinkDef>,
    pub sources: Vec<SourceDef>,
}

impl Default for SynthesizerDesc {
    fn default() -> Self {
        Self {
            channel_count: 1,
            sample_rate: 44100,
            bytes_per_sample: 2,
            sample_count: 0,
            controllers: Vec::new(),
            links: Vec::new(),
            sources: Vec::new(),
        }
    }
}
