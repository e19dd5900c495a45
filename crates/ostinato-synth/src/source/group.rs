//! Group source: child sources applied together.
//!
//! `All` sums every child. `Select` blends between the two children
//! straddling the select scalar; `Solo` plays the nearest one. In the
//! latter two modes a child contributing to any sample of the call is
//! generated once, lazily, into a pool-claimed scratch buffer, and
//! children that never contributed are skipped so their state advances
//! identically.

use super::{compile_source, CompileCtx, Source, SourceKind};
use crate::def::{GroupApplication, GroupDef};
use crate::render::{mix, CurveWindow, RenderCtx};
use crate::state::StateCell;
use crate::target::Target;
use ostinato_core::{PooledBuffer, Result};

pub(crate) struct GroupSource {
    sources: Vec<Source>,
    application: GroupApplication,
    select_range: f32,
    target_select: Target,
}

pub(crate) fn compile(ctx: &mut CompileCtx, def: &GroupDef, first_link: usize) -> Result<Source> {
    let mut silent = !def.common.enabled;
    let mut sources = Vec::new();

    if !silent {
        if def.sources.is_empty() {
            silent = true;
        } else {
            sources.reserve(def.sources.len());
            for child in &def.sources {
                sources.push(compile_source(ctx, child, first_link)?);
            }
        }
    }

    let select_range = sources.len().saturating_sub(1) as f32;
    let kind = SourceKind::Group(GroupSource {
        sources,
        application: def.application,
        select_range,
        target_select: Target::compile(&def.target_select, first_link),
    });
    Source::with_common(ctx, &def.common, first_link, silent, kind)
}

impl GroupSource {
    fn select(&self, ctx: &RenderCtx, sample: usize) -> f32 {
        self.target_select.value(ctx, sample, 0.0) * self.select_range
    }

    pub fn state_size(&mut self, offset: usize) -> usize {
        let mut size = if self.application == GroupApplication::All {
            0
        } else {
            1
        };
        for child in &mut self.sources {
            size += child.state_size(offset + size);
        }
        size
    }

    pub fn init_state(&self, offset: usize, state: &mut [StateCell]) {
        if self.application != GroupApplication::All {
            let mut leases = Vec::with_capacity(self.sources.len());
            leases.resize_with(self.sources.len(), || None);
            state[offset] = StateCell::GroupBuffers(leases);
        }
        for child in &self.sources {
            child.init_state(state);
        }
    }

    pub fn cleanup_state(&self, offset: usize, state: &mut [StateCell]) {
        for child in &self.sources {
            child.cleanup_state(state);
        }
        if self.application != GroupApplication::All {
            state[offset] = StateCell::Empty;
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
    ) -> Result<()> {
        match self.application {
            GroupApplication::All => {
                out[..samples * ctx.view.channel_count].fill(0.0);
                for child in &self.sources {
                    child.generate_sound(ctx, state, out, samples, win)?;
                }
                Ok(())
            }
            GroupApplication::Select | GroupApplication::Solo => {
                self.generate_picked(source, ctx, state, out, samples, win)
            }
        }
    }

    fn generate_picked(
        &self,
        source: &Source,
        ctx: &RenderCtx,
        state: &mut [StateCell],
        out: &mut [f32],
        samples: usize,
        win: CurveWindow,
    ) -> Result<()> {
        let offset = source.state_offset();
        let mut leases = match std::mem::replace(&mut state[offset], StateCell::Empty) {
            StateCell::GroupBuffers(leases) => leases,
            other => {
                state[offset] = other;
                out[..samples * ctx.view.channel_count].fill(0.0);
                return Ok(());
            }
        };
        if leases.len() != self.sources.len() {
            leases.clear();
            leases.resize_with(self.sources.len(), || None);
        }

        let result = match self.application {
            GroupApplication::Select => {
                self.pick_select(ctx, state, &mut leases, out, samples, win)
            }
            _ => self.pick_solo(ctx, state, &mut leases, out, samples, win),
        };

        // every per-child scratch goes back to the pool before return,
        // error path included; untouched children advance via skip
        match &result {
            Ok(()) => {
                for (index, lease) in leases.iter_mut().enumerate() {
                    if lease.take().is_none() {
                        self.sources[index].skip_sound(ctx, state, samples, win);
                    }
                }
            }
            Err(_) => {
                for lease in leases.iter_mut() {
                    lease.take();
                }
            }
        }
        state[offset] = StateCell::GroupBuffers(leases);
        result
    }

    fn pick_select(
        &self,
        ctx: &RenderCtx,
        state: &mut [StateCell],
        leases: &mut [Option<PooledBuffer>],
        out: &mut [f32],
        samples: usize,
        win: CurveWindow,
    ) -> Result<()> {
        let last = self.sources.len() - 1;

        for i in 0..samples {
            let select = self.select(ctx, win.eval_pos(i));
            let first = (select as usize).min(last);
            let blend = select - select.floor();
            let second = (first + 1).min(last);

            self.ensure_generated(first, ctx, state, leases, samples, win)?;
            self.ensure_generated(second, ctx, state, leases, samples, win)?;
            let (Some(buffer_first), Some(buffer_second)) =
                (leases[first].as_ref(), leases[second].as_ref())
            else {
                continue;
            };

            match ctx.view.channel_count {
                1 => out[i] = mix(buffer_first[i], buffer_second[i], blend),
                2 => {
                    out[i * 2] = mix(buffer_first[i * 2], buffer_second[i * 2], blend);
                    out[i * 2 + 1] = mix(buffer_first[i * 2 + 1], buffer_second[i * 2 + 1], blend);
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn pick_solo(
        &self,
        ctx: &RenderCtx,
        state: &mut [StateCell],
        leases: &mut [Option<PooledBuffer>],
        out: &mut [f32],
        samples: usize,
        win: CurveWindow,
    ) -> Result<()> {
        let last = self.sources.len() - 1;

        for i in 0..samples {
            let select = self.select(ctx, win.eval_pos(i));
            let whole = select as usize;
            let blend = select - select.floor();
            let solo = (if blend < 0.5 { whole } else { whole + 1 }).min(last);

            self.ensure_generated(solo, ctx, state, leases, samples, win)?;
            let Some(buffer) = leases[solo].as_ref() else {
                continue;
            };

            match ctx.view.channel_count {
                1 => out[i] = buffer[i],
                2 => {
                    out[i * 2] = buffer[i * 2];
                    out[i * 2 + 1] = buffer[i * 2 + 1];
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Generate child `index` once into its per-child scratch.
    fn ensure_generated(
        &self,
        index: usize,
        ctx: &RenderCtx,
        state: &mut [StateCell],
        leases: &mut [Option<PooledBuffer>],
        samples: usize,
        win: CurveWindow,
    ) -> Result<()> {
        if leases[index].is_some() {
            return Ok(());
        }
        let mut buffer = ctx.pool.claim(samples * ctx.view.channel_count)?;
        buffer.clear();
        self.sources[index].generate_sound(ctx, state, buffer.as_mut_slice(), samples, win)?;
        leases[index] = Some(buffer);
        Ok(())
    }

    pub fn skip(
        &self,
        ctx: &RenderCtx,
        state: &mut [StateCell],
        samples: usize,
        win: CurveWindow,
    ) {
        for child in &self.sources {
            child.skip_sound(ctx, state, samples, win);
        }
    }
}
