//! Sub-synthesizer source: another definition inlined into the parent.
//!
//! Compilation copies the child's declared links into the parent's
//! compiled link table with controller indices remapped through the
//! connection table, then compiles the child's sources against the
//! appended link range. Generation behaves like a group summing all
//! child sources. No runtime tie to the child definition remains.

use super::{compile_source, CompileCtx, Source, SourceKind};
use crate::def::SubSynthDef;
use crate::link::Link;
use crate::render::{CurveWindow, RenderCtx};
use crate::state::StateCell;
use ostinato_core::Result;

pub(crate) struct SubSynthSource {
    sources: Vec<Source>,
}

pub(crate) fn compile(ctx: &mut CompileCtx, def: &SubSynthDef, first_link: usize) -> Result<Source> {
    let mut silent = !def.common.enabled;
    let mut sources = Vec::new();

    if !silent {
        match &def.synthesizer {
            Some(child) => {
                let desc = child.desc_snapshot();
                if desc.sources.is_empty() {
                    silent = true;
                } else {
                    // child controller -> parent controller; unmapped or
                    // out-of-range connections stay undriven
                    let mapping: Vec<i32> = (0..desc.controllers.len())
                        .map(|i| {
                            let parent = def.connections.get(i).copied().unwrap_or(-1);
                            if parent < 0 || parent as usize >= ctx.controller_count {
                                -1
                            } else {
                                parent
                            }
                        })
                        .collect();

                    let child_first_link = ctx.links.len();
                    for link_def in &desc.links {
                        ctx.links.push(Link::remapped(link_def, &mapping));
                    }

                    sources.reserve(desc.sources.len());
                    for source_def in &desc.sources {
                        sources.push(compile_source(ctx, source_def, child_first_link)?);
                    }
                }
            }
            None => silent = true,
        }
    }

    Source::with_common(
        ctx,
        &def.common,
        first_link,
        silent,
        SourceKind::SubSynth(SubSynthSource { sources }),
    )
}

impl SubSynthSource {
    pub fn state_size(&mut self, offset: usize) -> usize {
        let mut size = 0;
        for child in &mut self.sources {
            size += child.state_size(offset + size);
        }
        size
    }

    pub fn init_state(&self, state: &mut [StateCell]) {
        for child in &self.sources {
            child.init_state(state);
        }
    }

    pub fn cleanup_state(&self, state: &mut [StateCell]) {
        for child in &self.sources {
            child.cleanup_state(state);
        }
    }

    pub fn generate(
        &self,
        ctx: &RenderCtx,
        state: &mut [StateCell],
        out: &mut [f32],
        samples: usize,
        win: CurveWindow,
    ) -> Result<()> {
        out[..samples * ctx.view.channel_count].fill(0.0);
        for child in &self.sources {
            child.generate_sound(ctx, state, out, samples, win)?;
        }
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
