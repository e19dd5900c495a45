//! Sampled sound source: one asset, one-shot or looping.

use super::{CompileCtx, Source, SourceKind};
use crate::def::SoundDef;
use crate::render::{mix, pan_gains, CurveWindow, RenderCtx};
use crate::state::StateCell;
use crate::target::Target;
use ostinato_core::Result;
use ostinato_sound::PcmData;
use std::sync::Arc;

const PLAY_THRESHOLD_PLAY: f32 = 0.75;
const PLAY_THRESHOLD_PAUSE: f32 = 0.25;

pub(crate) struct SoundSource {
    pcm: Arc<PcmData>,
    sample_count: usize,
    last_sample: usize,
    sample_rate: u32,
    looping: bool,
    min_speed: f32,
    speed_range: f32,
    target_speed: Target,
    target_play: Target,
}

/// Playback position plus the inter-sample blend fraction.
#[derive(Default)]
pub(crate) struct SoundState {
    pub position: usize,
    pub blend: f32,
}

pub(crate) fn compile(ctx: &mut CompileCtx, def: &SoundDef, first_link: usize) -> Result<Source> {
    let mut silent = !def.common.enabled;
    let mut sample_rate = 0;
    let mut pcm = None;

    if !silent {
        match &def.sound {
            Some(asset) => {
                asset.prepare()?;
                sample_rate = asset.info().sample_rate;
                match asset.pcm() {
                    Some(data) if data.frame_count() > 0 => pcm = Some(data),
                    // streaming or invalid assets carry no PCM
                    _ => silent = true,
                }
            }
            None => silent = true,
        }
    }

    let pcm = pcm.unwrap_or_else(|| Arc::new(PcmData::Mono16(Vec::new())));
    let frames = pcm.frame_count();
    let kind = SourceKind::Sound(SoundSource {
        pcm,
        sample_count: frames,
        last_sample: frames.saturating_sub(1),
        sample_rate,
        looping: def.looping,
        min_speed: def.min_speed,
        speed_range: def.max_speed - def.min_speed,
        target_speed: Target::compile(&def.target_speed, first_link),
        target_play: Target::compile(&def.target_play, first_link),
    });
    Source::with_common(ctx, &def.common, first_link, silent, kind)
}

impl SoundSource {
    fn play(&self, ctx: &RenderCtx, sample: usize) -> f32 {
        self.target_play.value(ctx, sample, 1.0)
    }

    fn speed(&self, ctx: &RenderCtx, sample: usize) -> f32 {
        self.min_speed + self.speed_range * self.target_speed.value(ctx, sample, 1.0)
    }

    #[inline]
    fn next_frame(&self, position: usize) -> usize {
        if self.looping {
            (position + 1) % self.sample_count
        } else {
            (position + 1).min(self.last_sample)
        }
    }

    #[inline]
    fn advance(&self, state: &mut SoundState, speed: f32) {
        let sum = state.blend + speed;
        let whole = sum.trunc();
        state.blend = sum - whole;

        let position = state.position as i64 + whole as i64;
        state.position = if self.looping {
            position.rem_euclid(self.sample_count as i64) as usize
        } else {
            position.clamp(0, self.last_sample as i64) as usize
        };
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

        // rate-mismatched sources emit silence until resampling exists
        if self.sample_count == 0 || self.sample_rate != ctx.view.sample_rate {
            out[..samples * channels].fill(0.0);
            return;
        }
        let StateCell::Sound(sound_state) = &mut state[source.state_offset()] else {
            out[..samples * channels].fill(0.0);
            return;
        };

        for i in 0..samples {
            let pos = win.eval_pos(i);
            let play = self.play(ctx, pos);

            if play < PLAY_THRESHOLD_PAUSE {
                sound_state.position = 0;
                sound_state.blend = 0.0;
                write_zero(out, channels, i);
            } else if play > PLAY_THRESHOLD_PLAY {
                if !self.looping && sound_state.position == self.last_sample {
                    write_zero(out, channels, i);
                    continue;
                }

                let speed = self.speed(ctx, pos);
                let position = sound_state.position;
                let next = self.next_frame(position);

                match channels {
                    1 => {
                        out[i] = mix(
                            self.pcm.mono(position),
                            self.pcm.mono(next),
                            sound_state.blend,
                        );
                    }
                    2 => {
                        let (mut l1, mut r1) = self.pcm.stereo(position);
                        let (mut l2, mut r2) = self.pcm.stereo(next);
                        if self.pcm.is_mono() {
                            let (left, right) = pan_gains(source.panning(ctx, pos));
                            l1 *= left;
                            r1 *= right;
                            l2 *= left;
                            r2 *= right;
                        }
                        out[i * 2] = mix(l1, l2, sound_state.blend);
                        out[i * 2 + 1] = mix(r1, r2, sound_state.blend);
                    }
                    _ => {}
                }

                self.advance(sound_state, speed);
            } else {
                // paused: hold position
                write_zero(out, channels, i);
            }
        }
    }

    /// Advance position and blend exactly as generate would.
    pub fn skip(
        &self,
        source: &Source,
        ctx: &RenderCtx,
        state: &mut [StateCell],
        samples: usize,
        win: CurveWindow,
    ) {
        if self.sample_count == 0 || self.sample_rate != ctx.view.sample_rate {
            return;
        }
        let StateCell::Sound(sound_state) = &mut state[source.state_offset()] else {
            return;
        };

        for i in 0..samples {
            let pos = win.eval_pos(i);
            let play = self.play(ctx, pos);

            if play < PLAY_THRESHOLD_PAUSE {
                sound_state.position = 0;
                sound_state.blend = 0.0;
            } else if play > PLAY_THRESHOLD_PLAY {
                if !self.looping && sound_state.position == self.last_sample {
                    continue;
                }
                let speed = self.speed(ctx, pos);
                self.advance(sound_state, speed);
            }
        }
    }
}

#[inline]
fn write_zero(out: &mut [f32], channels: usize, frame: usize) {
    out[frame * channels..(frame + 1) * channels].fill(0.0);
}
