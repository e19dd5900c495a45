//! Time-stretch and pitch-shift effect.
//!
//! Output is produced in 10 ms chunks. The time and pitch targets are
//! read once at each chunk's leading sample and pushed into per-channel
//! [`TimeStretcher`]s; whenever the stretchers run out of material, one
//! input block is rendered from the upstream stage with a narrowed curve
//! window so the sub-render's curve range stays inside the range prepared
//! for this call.

use crate::def::StretchDef;
use crate::render::{CurveWindow, RenderCtx};
use crate::source::{CompileCtx, Source};
use crate::state::StateCell;
use crate::target::Target;
use crate::vocoder::TimeStretcher;
use ostinato_core::Result;

const RANGE_MIN: f32 = -0.75;
const RANGE_MAX: f32 = 1.5;

pub(crate) struct StretchEffect {
    min_time: f32,
    time_range: f32,
    min_pitch: f32,
    pitch_range: f32,
    target_time: Target,
    target_pitch: Target,
    block_samples: usize,
    channel_count: usize,
}

/// Owned DSP state of one stretch effect instance.
pub(crate) struct StretchState {
    stretchers: Vec<TimeStretcher>,
    /// Interleaved upstream render block.
    input: Vec<f32>,
    /// One deinterleaved channel of the block.
    lane: Vec<f32>,
    /// One channel of popped output.
    out_lane: Vec<f32>,
}

impl StretchEffect {
    pub fn compile(ctx: &CompileCtx, def: &StretchDef, first_link: usize) -> StretchEffect {
        let min_time = def.min_time.clamp(RANGE_MIN, RANGE_MAX);
        let max_time = def.max_time.clamp(RANGE_MIN, RANGE_MAX);
        let min_pitch = def.min_pitch.clamp(RANGE_MIN, RANGE_MAX);
        let max_pitch = def.max_pitch.clamp(RANGE_MIN, RANGE_MAX);

        StretchEffect {
            min_time,
            time_range: max_time - min_time,
            min_pitch,
            pitch_range: max_pitch - min_pitch,
            target_time: Target::compile(&def.target_time, first_link),
            target_pitch: Target::compile(&def.target_pitch, first_link),
            // 10ms input blocks
            block_samples: (ctx.sample_rate as usize / 100).max(1),
            channel_count: ctx.channel_count,
        }
    }

    pub fn new_state(&self) -> StretchState {
        StretchState {
            stretchers: (0..self.channel_count).map(|_| TimeStretcher::new()).collect(),
            input: vec![0.0; self.block_samples * self.channel_count],
            lane: vec![0.0; self.block_samples],
            out_lane: vec![0.0; self.block_samples],
        }
    }

    fn time_stretch(&self, ctx: &RenderCtx, sample: usize) -> f32 {
        self.min_time + self.time_range * self.target_time.value(ctx, sample, 0.0)
    }

    fn pitch_shift(&self, ctx: &RenderCtx, sample: usize) -> f32 {
        self.min_pitch + self.pitch_range * self.target_pitch.value(ctx, sample, 0.0)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn generate(
        &self,
        source: &Source,
        index: usize,
        state_offset: usize,
        ctx: &RenderCtx,
        state: &mut [StateCell],
        out: &mut [f32],
        samples: usize,
        win: CurveWindow,
    ) -> Result<()> {
        // take the DSP state out of its slot so upstream renders can
        // borrow the table freely
        let mut dsp = match std::mem::replace(&mut state[state_offset], StateCell::Empty) {
            StateCell::Stretch(dsp) => dsp,
            other => {
                state[state_offset] = other;
                out[..samples * ctx.view.channel_count].fill(0.0);
                return Ok(());
            }
        };

        let result = self.run(source, index, &mut dsp, ctx, state, out, samples, win);
        state[state_offset] = StateCell::Stretch(dsp);
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn run(
        &self,
        source: &Source,
        index: usize,
        dsp: &mut StretchState,
        ctx: &RenderCtx,
        state: &mut [StateCell],
        out: &mut [f32],
        samples: usize,
        win: CurveWindow,
    ) -> Result<()> {
        let channels = self.channel_count;
        if channels != ctx.view.channel_count {
            // compiled for a different layout than the instance renders;
            // a recompile is already pending
            out[..samples * ctx.view.channel_count].fill(0.0);
            return Ok(());
        }
        let block = self.block_samples;
        let def_block_factor = win.factor * (block as f32 / samples as f32);
        let def_block_last = win.offset + win.factor * (samples - 1) as f32;

        let mut offset = 0;
        while offset < samples {
            let eval_pos = win.eval_pos(offset);
            let tempo = 1.0 + self.time_stretch(ctx, eval_pos);
            let pitch = 1.0 + self.pitch_shift(ctx, eval_pos);

            let mut remaining = (samples - offset).min(block);

            // both rates at unity with nothing in flight: render the
            // chunk directly, bit-exact bypass
            if (tempo - 1.0).abs() < 1e-6
                && (pitch - 1.0).abs() < 1e-6
                && dsp.stretchers.iter().all(TimeStretcher::is_empty)
            {
                let sub = CurveWindow {
                    offset: win.offset + win.factor * offset as f32,
                    factor: win.factor,
                };
                let range = &mut out[offset * channels..(offset + remaining) * channels];
                source.upstream_generate(index, ctx, state, range, remaining, sub)?;
                offset += remaining;
                continue;
            }

            for stretcher in dsp.stretchers.iter_mut() {
                stretcher.set_rates(tempo, pitch);
            }

            while remaining > 0 {
                let available = dsp
                    .stretchers
                    .iter()
                    .map(TimeStretcher::output_available)
                    .min()
                    .unwrap_or(0);
                let processed = available.min(remaining);

                if processed > 0 {
                    for (channel, stretcher) in dsp.stretchers.iter_mut().enumerate() {
                        let popped = stretcher.receive_samples(&mut dsp.out_lane[..processed]);
                        debug_assert_eq!(popped, processed);
                        for i in 0..processed {
                            out[(offset + i) * channels + channel] = dsp.out_lane[i];
                        }
                    }
                    offset += processed;
                    remaining -= processed;
                }

                if remaining > 0 {
                    // the stretched sub-render maps to a sub-range of the
                    // curve range prepared for the whole call
                    let block_offset = eval_pos as f32;
                    let block_factor = def_block_factor.min(def_block_last - block_offset);
                    source.upstream_generate(
                        index,
                        ctx,
                        state,
                        &mut dsp.input[..block * channels],
                        block,
                        CurveWindow {
                            offset: block_offset,
                            factor: block_factor,
                        },
                    )?;

                    for (channel, stretcher) in dsp.stretchers.iter_mut().enumerate() {
                        for i in 0..block {
                            dsp.lane[i] = dsp.input[i * channels + channel];
                        }
                        stretcher.put_samples(&dsp.lane[..block]);
                    }
                }
            }
        }

        Ok(())
    }
}
