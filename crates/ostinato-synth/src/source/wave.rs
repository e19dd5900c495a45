//! Periodic waveform source.

use super::{CompileCtx, Source, SourceKind};
use crate::def::{WaveDef, WaveType};
use crate::render::{pan_gains, CurveWindow, RenderCtx};
use crate::state::StateCell;
use crate::target::Target;
use ostinato_core::Result;
use std::f32::consts::TAU;

pub(crate) struct WaveSource {
    wave_type: WaveType,
    min_frequency: f32,
    frequency_range: f32,
    target_frequency: Target,
}

/// Current phase in [0, 1).
#[derive(Default)]
pub(crate) struct WaveState {
    pub phase: f32,
}

pub(crate) fn compile(ctx: &mut CompileCtx, def: &WaveDef, first_link: usize) -> Result<Source> {
    let kind = SourceKind::Wave(WaveSource {
        wave_type: def.wave_type,
        min_frequency: def.min_frequency,
        frequency_range: def.max_frequency - def.min_frequency,
        target_frequency: Target::compile(&def.target_frequency, first_link),
    });
    Source::with_common(ctx, &def.common, first_link, !def.common.enabled, kind)
}

impl WaveSource {
    fn frequency(&self, ctx: &RenderCtx, sample: usize) -> f32 {
        self.min_frequency + self.frequency_range * self.target_frequency.value(ctx, sample, 0.0)
    }

    #[inline]
    fn amplitude(&self, phase: f32) -> f32 {
        match self.wave_type {
            WaveType::Sine => (phase * TAU).sin(),
            WaveType::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            WaveType::Sawtooth => 2.0 * phase - 1.0,
            WaveType::Triangle => {
                let fract = phase * 4.0;
                if fract < 1.0 {
                    fract
                } else if fract > 3.0 {
                    fract - 4.0
                } else {
                    2.0 - fract
                }
            }
        }
    }

    pub fn generate(
        &self,
        source: &Source,
        ctx: &RenderCtx,
        state: &mut [StateCell],
        out: &mut [f32],
        samples: usize,
        win: CurveWindow,
    ) {
        let channels = ctx.view.channel_count;
        let StateCell::Wave(wave_state) = &mut state[source.state_offset()] else {
            out[..samples * channels].fill(0.0);
            return;
        };
        let inv_sample_rate = ctx.view.inv_sample_rate;
        let mut phase = wave_state.phase;

        match channels {
            1 => {
                for (i, value) in out.iter_mut().enumerate().take(samples) {
                    let pos = win.eval_pos(i);
                    *value = self.amplitude(phase);
                    phase = (phase + self.frequency(ctx, pos) * inv_sample_rate).fract();
                }
            }
            2 => {
                for i in 0..samples {
                    let pos = win.eval_pos(i);
                    let (left, right) = pan_gains(source.panning(ctx, pos));
                    let value = self.amplitude(phase);
                    out[i * 2] = value * left;
                    out[i * 2 + 1] = value * right;
                    phase = (phase + self.frequency(ctx, pos) * inv_sample_rate).fract();
                }
            }
            _ => {}
        }

        wave_state.phase = phase;
    }

    /// Advance the phase exactly as generate would.
    pub fn skip(
        &self,
        source: &Source,
        ctx: &RenderCtx,
        state: &mut [StateCell],
        samples: usize,
        win: CurveWindow,
    ) {
        let StateCell::Wave(wave_state) = &mut state[source.state_offset()] else {
            return;
        };
        let inv_sample_rate = ctx.view.inv_sample_rate;
        let mut phase = wave_state.phase;
        for i in 0..samples {
            phase = (phase + self.frequency(ctx, win.eval_pos(i)) * inv_sample_rate).fract();
        }
        wave_state.phase = phase;
    }
}
