//! Compiled sources.
//!
//! Every source shares the same protocol: report and record its state
//! slots, initialize and tear them down, generate into a scratch buffer
//! through its effect chain and mix the result into the caller's buffer,
//! or skip forward without writing samples so inactive group children
//! stay phase-continuous.

pub(crate) mod chain;
pub(crate) mod group;
pub(crate) mod sound;
pub(crate) mod subsynth;
pub(crate) mod wave;

use crate::def::{MixMode, SourceCommonDef, SourceDef};
use crate::effect::{compile_effect, Effect, EffectKind};
use crate::link::Link;
use crate::render::{mix, CurveWindow, RenderCtx};
use crate::state::StateCell;
use crate::target::Target;
use ostinato_core::Result;

/// Everything source compilation needs: the compiled link table being
/// built and the declared output format.
pub(crate) struct CompileCtx {
    pub links: Vec<Link>,
    pub sample_rate: u32,
    pub channel_count: usize,
    pub controller_count: usize,
}

pub(crate) enum SourceKind {
    Wave(wave::WaveSource),
    Sound(sound::SoundSource),
    Chain(chain::ChainSource),
    Group(group::GroupSource),
    SubSynth(subsynth::SubSynthSource),
}

pub(crate) struct Source {
    silent: bool,
    state_offset: usize,
    mix_mode: MixMode,
    min_volume: f32,
    volume_range: f32,
    min_panning: f32,
    panning_range: f32,
    target_blend_factor: Target,
    target_volume: Target,
    target_panning: Target,
    effects: Vec<Effect>,
    kind: SourceKind,
}

/// Compile one declared source. The single edit point when new source
/// kinds are added.
pub(crate) fn compile_source(
    ctx: &mut CompileCtx,
    def: &SourceDef,
    first_link: usize,
) -> Result<Source> {
    match def {
        SourceDef::Wave(def) => wave::compile(ctx, def, first_link),
        SourceDef::Sound(def) => sound::compile(ctx, def, first_link),
        SourceDef::Chain(def) => chain::compile(ctx, def, first_link),
        SourceDef::Group(def) => group::compile(ctx, def, first_link),
        SourceDef::SubSynth(def) => subsynth::compile(ctx, def, first_link),
    }
}

impl Source {
    /// Build the shared part of a compiled source; `silent` is the
    /// kind-specific verdict. Silent sources carry no effect chain.
    pub fn with_common(
        ctx: &mut CompileCtx,
        common: &SourceCommonDef,
        first_link: usize,
        silent: bool,
        kind: SourceKind,
    ) -> Result<Source> {
        let min_volume = common.min_volume.max(0.0);
        let max_volume = common.max_volume.max(min_volume);
        let min_panning = common.min_panning.clamp(-1.0, 1.0);
        let max_panning = common.max_panning.clamp(min_panning, 1.0);

        let mut effects = Vec::new();
        if !silent {
            for def in common.effects.iter().filter(|def| def.enabled()) {
                effects.push(compile_effect(ctx, def, first_link)?);
            }
        }

        Ok(Source {
            silent,
            state_offset: 0,
            mix_mode: common.mix_mode,
            min_volume,
            volume_range: max_volume - min_volume,
            min_panning,
            panning_range: max_panning - min_panning,
            target_blend_factor: Target::compile(&common.target_blend_factor, first_link),
            target_volume: Target::compile(&common.target_volume, first_link),
            target_panning: Target::compile(&common.target_panning, first_link),
            effects,
            kind,
        })
    }

    pub fn silent(&self) -> bool {
        self.silent
    }

    pub fn state_offset(&self) -> usize {
        self.state_offset
    }

    /// Record slot offsets and report the slots needed: the source's own
    /// state (including contained sub-sources) first, then its effects.
    pub fn state_size(&mut self, offset: usize) -> usize {
        self.state_offset = offset;
        let mut size = match &mut self.kind {
            SourceKind::Wave(_) | SourceKind::Sound(_) | SourceKind::Chain(_) => 1,
            SourceKind::Group(group) => group.state_size(offset),
            SourceKind::SubSynth(sub) => sub.state_size(offset),
        };
        for effect in &mut self.effects {
            size += effect.state_size(offset + size);
        }
        size
    }

    pub fn init_state(&self, state: &mut [StateCell]) {
        match &self.kind {
            SourceKind::Wave(_) => {
                state[self.state_offset] = StateCell::Wave(Default::default());
            }
            SourceKind::Sound(_) => {
                state[self.state_offset] = StateCell::Sound(Default::default());
            }
            SourceKind::Chain(_) => {
                state[self.state_offset] = StateCell::Chain(Default::default());
            }
            SourceKind::Group(group) => group.init_state(self.state_offset, state),
            SourceKind::SubSynth(sub) => sub.init_state(state),
        }
        for effect in &self.effects {
            effect.init_state(state);
        }
    }

    pub fn cleanup_state(&self, state: &mut [StateCell]) {
        for effect in &self.effects {
            effect.cleanup_state(state);
        }
        match &self.kind {
            SourceKind::Group(group) => group.cleanup_state(self.state_offset, state),
            SourceKind::SubSynth(sub) => sub.cleanup_state(state),
            _ => state[self.state_offset] = StateCell::Empty,
        }
    }

    /// Generate `samples` frames and mix them into `out`.
    pub fn generate_sound(
        &self,
        ctx: &RenderCtx,
        state: &mut [StateCell],
        out: &mut [f32],
        samples: usize,
        win: CurveWindow,
    ) -> Result<()> {
        if self.silent {
            self.apply_silence(ctx, out, samples, win);
            return Ok(());
        }

        let mut scratch = ctx.pool.claim(samples * ctx.view.channel_count)?;
        if let Some(entry) = self.effects.len().checked_sub(1) {
            self.effect_generate(entry, ctx, state, scratch.as_mut_slice(), samples, win)?;
        } else {
            self.generate_source(ctx, state, scratch.as_mut_slice(), samples, win)?;
        }
        self.apply_generated(ctx, out, scratch.as_slice(), samples, win);
        Ok(())
    }

    /// Advance state as generate would, without producing samples.
    pub fn skip_sound(
        &self,
        ctx: &RenderCtx,
        state: &mut [StateCell],
        samples: usize,
        win: CurveWindow,
    ) {
        if self.silent {
            return;
        }
        // the stretch effect skips by passing through, so the chain
        // reduces to the bare source advance
        self.skip_source(ctx, state, samples, win);
    }

    /// Effect-free generation of the bare source.
    fn generate_source(
        &self,
        ctx: &RenderCtx,
        state: &mut [StateCell],
        out: &mut [f32],
        samples: usize,
        win: CurveWindow,
    ) -> Result<()> {
        match &self.kind {
            SourceKind::Wave(wave) => {
                wave.generate(self, ctx, state, out, samples, win);
                Ok(())
            }
            SourceKind::Sound(sound) => {
                sound.generate(self, ctx, state, out, samples, win);
                Ok(())
            }
            SourceKind::Chain(chain) => {
                chain.generate(self, ctx, state, out, samples, win);
                Ok(())
            }
            SourceKind::Group(group) => group.generate(self, ctx, state, out, samples, win),
            SourceKind::SubSynth(sub) => sub.generate(ctx, state, out, samples, win),
        }
    }

    fn skip_source(
        &self,
        ctx: &RenderCtx,
        state: &mut [StateCell],
        samples: usize,
        win: CurveWindow,
    ) {
        match &self.kind {
            SourceKind::Wave(wave) => wave.skip(self, ctx, state, samples, win),
            SourceKind::Sound(sound) => sound.skip(self, ctx, state, samples, win),
            SourceKind::Chain(chain) => chain.skip(self, ctx, state, samples, win),
            SourceKind::Group(group) => group.skip(ctx, state, samples, win),
            SourceKind::SubSynth(sub) => sub.skip(ctx, state, samples, win),
        }
    }

    fn effect_generate(
        &self,
        index: usize,
        ctx: &RenderCtx,
        state: &mut [StateCell],
        out: &mut [f32],
        samples: usize,
        win: CurveWindow,
    ) -> Result<()> {
        let effect = &self.effects[index];
        match &effect.kind {
            EffectKind::Stretch(stretch) => stretch.generate(
                self,
                index,
                effect.state_offset(),
                ctx,
                state,
                out,
                samples,
                win,
            ),
        }
    }

    /// Called by effect `index` to pull input from its enabled
    /// predecessor, or from the bare source at the chain's base.
    pub(crate) fn upstream_generate(
        &self,
        index: usize,
        ctx: &RenderCtx,
        state: &mut [StateCell],
        out: &mut [f32],
        samples: usize,
        win: CurveWindow,
    ) -> Result<()> {
        if index == 0 {
            self.generate_source(ctx, state, out, samples, win)
        } else {
            self.effect_generate(index - 1, ctx, state, out, samples, win)
        }
    }

    pub(crate) fn blend_factor(&self, ctx: &RenderCtx, sample: usize) -> f32 {
        self.target_blend_factor.value(ctx, sample, 1.0)
    }

    pub(crate) fn volume(&self, ctx: &RenderCtx, sample: usize) -> f32 {
        self.min_volume + self.volume_range * self.target_volume.value(ctx, sample, 0.0)
    }

    pub(crate) fn panning(&self, ctx: &RenderCtx, sample: usize) -> f32 {
        self.min_panning + self.panning_range * self.target_panning.value(ctx, sample, 0.0)
    }

    /// Silent sources still shape a blend mix: the accumulated buffer is
    /// scaled by `1 - blend_factor`. Add mixes are untouched.
    fn apply_silence(&self, ctx: &RenderCtx, out: &mut [f32], samples: usize, win: CurveWindow) {
        if self.mix_mode != MixMode::Blend {
            return;
        }

        match ctx.view.channel_count {
            1 => {
                for (i, value) in out.iter_mut().enumerate().take(samples) {
                    *value *= 1.0 - self.blend_factor(ctx, win.eval_pos(i));
                }
            }
            2 => {
                for i in 0..samples {
                    let factor = 1.0 - self.blend_factor(ctx, win.eval_pos(i));
                    out[i * 2] *= factor;
                    out[i * 2 + 1] *= factor;
                }
            }
            _ => {}
        }
    }

    /// Mix the generated scratch into `out` with per-sample volume.
    fn apply_generated(
        &self,
        ctx: &RenderCtx,
        out: &mut [f32],
        generated: &[f32],
        samples: usize,
        win: CurveWindow,
    ) {
        match (ctx.view.channel_count, self.mix_mode) {
            (1, MixMode::Add) => {
                for i in 0..samples {
                    let volume = self.volume(ctx, win.eval_pos(i));
                    out[i] += generated[i] * volume;
                }
            }
            (1, MixMode::Blend) => {
                for i in 0..samples {
                    let pos = win.eval_pos(i);
                    let volume = self.volume(ctx, pos);
                    let blend = self.blend_factor(ctx, pos);
                    out[i] = mix(out[i], generated[i] * volume, blend);
                }
            }
            (2, MixMode::Add) => {
                for i in 0..samples {
                    let volume = self.volume(ctx, win.eval_pos(i));
                    out[i * 2] += generated[i * 2] * volume;
                    out[i * 2 + 1] += generated[i * 2 + 1] * volume;
                }
            }
            (2, MixMode::Blend) => {
                for i in 0..samples {
                    let pos = win.eval_pos(i);
                    let volume = self.volume(ctx, pos);
                    let blend = self.blend_factor(ctx, pos);
                    out[i * 2] = mix(out[i * 2], generated[i * 2] * volume, blend);
                    out[i * 2 + 1] = mix(out[i * 2 + 1], generated[i * 2 + 1] * volume, blend);
                }
            }
            _ => {}
        }
    }
}
