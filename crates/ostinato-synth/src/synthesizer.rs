//! The synthesizer definition and its compiled runtime graph.
//!
//! A `Synthesizer` owns a declared graph (format, controllers, links,
//! sources) and the arrays compiled from it. Edits mutate the declaration
//! under the internal mutex and bump the update version; content edits
//! additionally mark the compiled graph dirty so a long edit sequence
//! recompiles once, at the next `prepare`. Instances observe the version
//! counter to know when to rebuild their own state.

use crate::controller::ControllerDef;
use crate::def::{SourceDef, SynthesizerDesc};
use crate::link::{Link, LinkDef};
use crate::render::{CurveWindow, InstanceView, RenderCtx};
use crate::source::{compile_source, CompileCtx, Source};
use crate::state::StateCell;
use ostinato_core::{Result, SharedBufferPool};
use parking_lot::Mutex;

pub(crate) struct Compiled {
    pub links: Vec<Link>,
    pub sources: Vec<Source>,
    pub silent: bool,
    pub state_size: usize,
}

impl Default for Compiled {
    fn default() -> Self {
        Self {
            links: Vec::new(),
            sources: Vec::new(),
            silent: true,
            state_size: 0,
        }
    }
}

pub(crate) struct SynthInner {
    pub desc: SynthesizerDesc,
    pub version: u64,
    dirty_content: bool,
    pub compiled: Compiled,
}

/// A synthesizer definition shared by its voices.
pub struct Synthesizer {
    pub(crate) inner: Mutex<SynthInner>,
}

impl Default for Synthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Synthesizer {
    pub fn new() -> Synthesizer {
        Self::with_desc(SynthesizerDesc::default())
    }

    pub fn with_desc(desc: SynthesizerDesc) -> Synthesizer {
        Synthesizer {
            inner: Mutex::new(SynthInner {
                desc,
                version: 1,
                dirty_content: true,
                compiled: Compiled::default(),
            }),
        }
    }

    /// Output channel count, clamped to 1 or 2 by instances.
    pub fn set_channel_count(&self, channels: u32) {
        let mut inner = self.inner.lock();
        inner.desc.channel_count = channels;
        inner.version += 1;
    }

    pub fn set_sample_rate(&self, sample_rate: u32) {
        let mut inner = self.inner.lock();
        inner.desc.sample_rate = sample_rate;
        inner.version += 1;
    }

    /// Output sample width in bytes, clamped to 1 or 2 by instances.
    pub fn set_bytes_per_sample(&self, bytes: u32) {
        let mut inner = self.inner.lock();
        inner.desc.bytes_per_sample = bytes;
        inner.version += 1;
    }

    /// Nominal play length in samples.
    pub fn set_sample_count(&self, samples: u64) {
        let mut inner = self.inner.lock();
        inner.desc.sample_count = samples;
        inner.version += 1;
    }

    /// Replace the declared controller slots.
    pub fn set_controllers(&self, controllers: Vec<ControllerDef>) {
        let mut inner = self.inner.lock();
        inner.desc.controllers = controllers;
        inner.version += 1;
    }

    /// The controller count or structure changed; instances rebuild
    /// their controller arrays.
    pub fn controllers_changed(&self) {
        self.inner.lock().version += 1;
    }

    /// Replace the declared links and mark the compiled graph dirty.
    pub fn set_links(&self, links: Vec<LinkDef>) {
        let mut inner = self.inner.lock();
        inner.desc.links = links;
        inner.mark_content_dirty();
    }

    pub fn links_changed(&self) {
        self.inner.lock().mark_content_dirty();
    }

    /// Replace the declared sources and mark the compiled graph dirty.
    pub fn set_sources(&self, sources: Vec<SourceDef>) {
        let mut inner = self.inner.lock();
        inner.desc.sources = sources;
        inner.mark_content_dirty();
    }

    pub fn sources_changed(&self) {
        self.inner.lock().mark_content_dirty();
    }

    /// Clone of the current declaration, used when compiling parents of
    /// sub-synthesizer sources.
    pub fn desc_snapshot(&self) -> SynthesizerDesc {
        self.inner.lock().desc.clone()
    }

    /// Rebuild the compiled graph if content changed. Idempotent; a
    /// failed rebuild keeps the previous compiled graph and stays dirty.
    pub fn prepare(&self) -> Result<()> {
        self.inner.lock().prepare()
    }

    /// Compiled silence verdict (all sources silent). Meaningful after
    /// `prepare`.
    pub fn is_silent(&self) -> bool {
        self.inner.lock().compiled.silent
    }

    /// Compiled per-instance state size in slots. Meaningful after
    /// `prepare`.
    pub fn state_data_size(&self) -> usize {
        self.inner.lock().compiled.state_size
    }
}

impl SynthInner {
    fn mark_content_dirty(&mut self) {
        if self.dirty_content {
            return;
        }
        self.dirty_content = true;
        self.version += 1;
    }

    pub fn prepare(&mut self) -> Result<()> {
        if !self.dirty_content {
            return Ok(());
        }
        self.compiled = compile(&self.desc)?;
        self.dirty_content = false;
        Ok(())
    }

    pub fn init_state_data(&self, state: &mut [StateCell]) {
        for source in &self.compiled.sources {
            source.init_state(state);
        }
    }

    pub fn cleanup_state_data(&self, state: &mut [StateCell]) {
        for source in &self.compiled.sources {
            source.cleanup_state(state);
        }
    }

    /// Run every top-level source over the full requested range.
    pub fn generate(
        &self,
        view: &InstanceView,
        state: &mut [StateCell],
        buffer: &mut [f32],
        samples: usize,
        pool: &SharedBufferPool,
    ) -> Result<()> {
        if self.compiled.silent {
            return Ok(());
        }

        let ctx = RenderCtx {
            view,
            links: &self.compiled.links,
            pool,
        };
        for source in &self.compiled.sources {
            source.generate_sound(&ctx, state, buffer, samples, CurveWindow::FULL)?;
        }
        Ok(())
    }
}

fn compile(desc: &SynthesizerDesc) -> Result<Compiled> {
    let mut ctx = CompileCtx {
        links: desc.links.iter().map(Link::new).collect(),
        sample_rate: desc.sample_rate,
        channel_count: desc.channel_count.clamp(1, 2) as usize,
        controller_count: desc.controllers.len(),
    };

    let mut sources = Vec::with_capacity(desc.sources.len());
    for def in &desc.sources {
        sources.push(compile_source(&mut ctx, def, 0)?);
    }

    let mut silent = true;
    let mut state_size = 0;
    for source in &mut sources {
        if !source.silent() {
            silent = false;
        }
        state_size += source.state_size(state_size);
    }

    Ok(Compiled {
        links: ctx.links,
        sources,
        silent,
        state_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::def::{GroupApplication, GroupDef, WaveDef};

    fn wave() -> SourceDef {
        SourceDef::Wave(WaveDef::default())
    }

    #[test]
    fn test_prepare_compiles_sources_in_order() {
        let synthesizer = Synthesizer::new();
        synthesizer.set_sources(vec![wave(), wave()]);
        synthesizer.prepare().unwrap();
        assert!(!synthesizer.is_silent());
        assert_eq!(synthesizer.state_data_size(), 2);
    }

    #[test]
    fn test_empty_synthesizer_is_silent() {
        let synthesizer = Synthesizer::new();
        synthesizer.prepare().unwrap();
        assert!(synthesizer.is_silent());
        assert_eq!(synthesizer.state_data_size(), 0);
    }

    #[test]
    fn test_disabled_sources_keep_synthesizer_silent() {
        let synthesizer = Synthesizer::new();
        let mut def = WaveDef::default();
        def.common.enabled = false;
        synthesizer.set_sources(vec![SourceDef::Wave(def)]);
        synthesizer.prepare().unwrap();
        assert!(synthesizer.is_silent());
    }

    #[test]
    fn test_edits_bump_version_once_per_dirty_cycle() {
        let synthesizer = Synthesizer::new();
        synthesizer.prepare().unwrap();
        let before = synthesizer.inner.lock().version;

        synthesizer.links_changed();
        synthesizer.sources_changed();
        // already dirty, the second notification folds in
        assert_eq!(synthesizer.inner.lock().version, before + 1);

        synthesizer.prepare().unwrap();
        synthesizer.sources_changed();
        assert_eq!(synthesizer.inner.lock().version, before + 2);
    }

    #[test]
    fn test_group_children_get_disjoint_state_ranges() {
        let synthesizer = Synthesizer::new();
        synthesizer.set_sources(vec![SourceDef::Group(GroupDef {
            application: GroupApplication::Select,
            sources: vec![wave(), wave()],
            ..GroupDef::default()
        })]);
        synthesizer.prepare().unwrap();
        // buffers slot + two wave slots
        assert_eq!(synthesizer.state_data_size(), 3);
    }
}
