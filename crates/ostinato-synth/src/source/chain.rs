//! Chain source: ordered one-shots picked by the select target.
//!
//! The play target spans three zones in rising order: below the pause
//! threshold the chain resets and re-arms; between wait and play a
//! running sound finishes but nothing new starts; above the play
//! threshold an armed idle chain reads the select target once and starts
//! the picked sound. Crossing a sound's last sample re-enters idle, and
//! a fresh trigger requires the play value to dip below the pause
//! threshold first.
//!
//! Chain sounds must be fully loaded; streaming chains are not supported.

use super::{CompileCtx, Source, SourceKind};
use crate::def::ChainDef;
use crate::render::{mix, pan_gains, CurveWindow, RenderCtx};
use crate::state::StateCell;
use crate::target::Target;
use ostinato_core::Result;
use ostinato_sound::PcmData;
use std::sync::Arc;

const PLAY_THRESHOLD_PLAY: f32 = 5.0 / 6.0;
const PLAY_THRESHOLD_WAIT: f32 = 3.0 / 6.0;
const PLAY_THRESHOLD_PAUSE: f32 = 1.0 / 6.0;

struct ChainSound {
    pcm: Option<Arc<PcmData>>,
    sample_count: usize,
    last_sample: usize,
    sample_rate: u32,
}

pub(crate) struct ChainSource {
    sounds: Vec<ChainSound>,
    select_range: f32,
    min_speed: f32,
    speed_range: f32,
    target_speed: Target,
    target_select: Target,
    target_play: Target,
}

/// Current sound index (-1 idle), position, blend fraction, the defunct
/// latch and the retrigger arm.
pub(crate) struct ChainState {
    pub sound: i32,
    pub position: usize,
    pub blend: f32,
    pub defunct: bool,
    pub armed: bool,
}

impl Default for ChainState {
    fn default() -> Self {
        Self {
            sound: -1,
            position: 0,
            blend: 0.0,
            defunct: false,
            armed: true,
        }
    }
}

pub(crate) fn compile(ctx: &mut CompileCtx, def: &ChainDef, first_link: usize) -> Result<Source> {
    let mut silent = !def.common.enabled;
    let mut sounds = Vec::new();

    if !silent {
        if def.sounds.is_empty() {
            silent = true;
        } else {
            let mut has_valid_sound = false;
            for asset in &def.sounds {
                asset.prepare()?;
                let pcm = asset.pcm().filter(|pcm| pcm.frame_count() > 0);
                if pcm.is_some() {
                    has_valid_sound = true;
                }
                let frames = pcm.as_ref().map_or(0, |pcm| pcm.frame_count());
                sounds.push(ChainSound {
                    pcm,
                    sample_count: frames,
                    last_sample: frames.saturating_sub(1),
                    sample_rate: asset.info().sample_rate,
                });
            }
            if !has_valid_sound {
                silent = true;
            }
        }
    }

    let select_range = sounds.len() as f32;
    let kind = SourceKind::Chain(ChainSource {
        sounds,
        select_range,
        min_speed: def.min_speed,
        speed_range: def.max_speed - def.min_speed,
        target_speed: Target::compile(&def.target_speed, first_link),
        target_select: Target::compile(&def.target_select, first_link),
        target_play: Target::compile(&def.target_play, first_link),
    });
    Source::with_common(ctx, &def.common, first_link, silent, kind)
}

impl ChainSource {
    fn play(&self, ctx: &RenderCtx, sample: usize) -> f32 {
        self.target_play.value(ctx, sample, 1.0)
    }

    fn speed(&self, ctx: &RenderCtx, sample: usize) -> f32 {
        self.min_speed + self.speed_range * self.target_speed.value(ctx, sample, 1.0)
    }

    fn select(&self, ctx: &RenderCtx, sample: usize) -> usize {
        let scaled = self.target_select.value(ctx, sample, 0.0) * self.select_range;
        (scaled as usize).min(self.sounds.len() - 1)
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
        let StateCell::Chain(chain_state) = &mut state[source.state_offset()] else {
            out[..samples * channels].fill(0.0);
            return;
        };
        if chain_state.defunct {
            out[..samples * channels].fill(0.0);
            return;
        }

        for i in 0..samples {
            let pos = win.eval_pos(i);
            let play = self.play(ctx, pos);

            if play < PLAY_THRESHOLD_PAUSE {
                chain_state.sound = -1;
                chain_state.position = 0;
                chain_state.blend = 0.0;
                chain_state.armed = true;
                write_zero(out, channels, i);
            } else if play > PLAY_THRESHOLD_WAIT {
                if chain_state.sound != -1
                    && chain_state.position == self.sounds[chain_state.sound as usize].last_sample
                {
                    chain_state.sound = -1;
                }

                if chain_state.sound == -1 {
                    if play <= PLAY_THRESHOLD_PLAY || !chain_state.armed {
                        write_zero(out, channels, i);
                        continue;
                    }
                    chain_state.sound = self.select(ctx, pos) as i32;
                    chain_state.position = 0;
                    chain_state.blend = 0.0;
                    chain_state.armed = false;
                }

                let sound = &self.sounds[chain_state.sound as usize];

                // rate-mismatched sounds kill the chain until re-init
                if sound.sample_rate != ctx.view.sample_rate {
                    out[i * channels..samples * channels].fill(0.0);
                    chain_state.defunct = true;
                    return;
                }
                let Some(pcm) = &sound.pcm else {
                    write_zero(out, channels, i);
                    continue;
                };

                let position = chain_state.position;
                let next = (position + 1) % sound.sample_count;
                match channels {
                    1 => {
                        out[i] = mix(pcm.mono(position), pcm.mono(next), chain_state.blend);
                    }
                    2 => {
                        let (mut l1, mut r1) = pcm.stereo(position);
                        let (mut l2, mut r2) = pcm.stereo(next);
                        if pcm.is_mono() {
                            let (left, right) = pan_gains(source.panning(ctx, pos));
                            l1 *= left;
                            r1 *= right;
                            l2 *= left;
                            r2 *= right;
                        }
                        out[i * 2] = mix(l1, l2, chain_state.blend);
                        out[i * 2 + 1] = mix(r1, r2, chain_state.blend);
                    }
                    _ => {}
                }

                let speed = self.speed(ctx, pos);
                advance(chain_state, sound, speed);
            } else {
                write_zero(out, channels, i);
            }
        }
    }

    /// Run the same machine without writing samples.
    pub fn skip(
        &self,
        source: &Source,
        ctx: &RenderCtx,
        state: &mut [StateCell],
        samples: usize,
        win: CurveWindow,
    ) {
        let StateCell::Chain(chain_state) = &mut state[source.state_offset()] else {
            return;
        };
        if chain_state.defunct {
            return;
        }

        for i in 0..samples {
            let pos = win.eval_pos(i);
            let play = self.play(ctx, pos);

            if play < PLAY_THRESHOLD_PAUSE {
                chain_state.sound = -1;
                chain_state.position = 0;
                chain_state.blend = 0.0;
                chain_state.armed = true;
            } else if play > PLAY_THRESHOLD_WAIT {
                if chain_state.sound != -1
                    && chain_state.position == self.sounds[chain_state.sound as usize].last_sample
                {
                    chain_state.sound = -1;
                }

                if chain_state.sound == -1 {
                    if play <= PLAY_THRESHOLD_PLAY || !chain_state.armed {
                        continue;
                    }
                    chain_state.sound = self.select(ctx, pos) as i32;
                    chain_state.position = 0;
                    chain_state.blend = 0.0;
                    chain_state.armed = false;
                }

                let sound = &self.sounds[chain_state.sound as usize];
                if sound.sample_rate != ctx.view.sample_rate {
                    chain_state.defunct = true;
                    return;
                }
                if sound.pcm.is_none() {
                    continue;
                }

                let speed = self.speed(ctx, pos);
                advance(chain_state, sound, speed);
            }
        }
    }
}

#[inline]
fn advance(state: &mut ChainState, sound: &ChainSound, speed: f32) {
    let sum = state.blend + speed;
    let whole = sum.trunc();
    state.blend = sum - whole;
    state.position =
        (state.position as i64 + whole as i64).clamp(0, sound.last_sample as i64) as usize;
}

#[inline]
fn write_zero(out: &mut [f32], channels: usize, frame: usize) {
    out[frame * channels..(frame + 1) * channels].fill(0.0);
}
