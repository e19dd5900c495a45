//! Per-voice synthesizer instances.
//!
//! An instance owns the controller curves, the state slot table and the
//! cached output format of one voice. `produce` is the audio-thread entry
//! point; every public method holds the instance mutex, and the
//! synthesizer mutex is always taken after it, never before, so a
//! control-thread edit can never deadlock against the audio thread.

use crate::controller::{Controller, ControllerDef};
use crate::render::InstanceView;
use crate::state::{new_state_table, StateCell};
use crate::synthesizer::{SynthInner, Synthesizer};
use ostinato_core::{write_pcm, write_silence, Error, Result, SharedBufferPool};
use parking_lot::Mutex;
use std::sync::Arc;

struct InstanceInner {
    synthesizer: Option<Arc<Synthesizer>>,
    synthesizer_version: u64,

    controller_defs: Vec<ControllerDef>,
    controllers: Vec<Controller>,

    channel_count: usize,
    sample_rate: u32,
    bytes_per_sample: usize,
    sample_count: u64,
    silent: bool,
    inv_sample_rate: f32,
    generate_sample_size: usize,

    dirty_synthesizer: bool,
    dirty_controllers: bool,
    dirty_format: bool,

    state: Vec<StateCell>,
}

/// One voice of a synthesizer definition.
pub struct SynthesizerInstance {
    inner: Mutex<InstanceInner>,
    pool: SharedBufferPool,
}

impl SynthesizerInstance {
    pub fn new(pool: SharedBufferPool) -> SynthesizerInstance {
        SynthesizerInstance {
            inner: Mutex::new(InstanceInner {
                synthesizer: None,
                synthesizer_version: 0,
                controller_defs: Vec::new(),
                controllers: Vec::new(),
                // smallest supported format while unbound
                channel_count: 1,
                sample_rate: 11025,
                bytes_per_sample: 1,
                sample_count: 0,
                silent: true,
                inv_sample_rate: 1.0 / 11025.0,
                generate_sample_size: 1,
                dirty_synthesizer: true,
                dirty_controllers: false,
                dirty_format: true,
                state: Vec::new(),
            }),
            pool,
        }
    }

    pub fn with_synthesizer(
        pool: SharedBufferPool,
        synthesizer: Arc<Synthesizer>,
    ) -> SynthesizerInstance {
        let instance = Self::new(pool);
        instance.set_synthesizer(Some(synthesizer));
        instance
    }

    /// Bind a new definition (or none). The current state is released
    /// and everything rebuilds on the next produce.
    pub fn set_synthesizer(&self, synthesizer: Option<Arc<Synthesizer>>) {
        let mut inner = self.inner.lock();
        let old = inner.synthesizer.take();
        Self::release_state(&mut inner, old.as_deref());

        inner.controllers.clear();
        inner.synthesizer = synthesizer;
        inner.synthesizer_version = 0;
        inner.dirty_synthesizer = true;
    }

    /// Set this voice's curve for one controller slot.
    pub fn set_controller(&self, index: usize, def: ControllerDef) {
        let mut inner = self.inner.lock();
        if inner.controller_defs.len() <= index {
            inner
                .controller_defs
                .resize_with(index + 1, ControllerDef::default);
        }
        inner.controller_defs[index] = def;
        self.mark_controller_dirty(&mut inner, index);
    }

    /// The host edited controller `index` in place.
    pub fn controller_changed(&self, index: usize) {
        let mut inner = self.inner.lock();
        self.mark_controller_dirty(&mut inner, index);
    }

    fn mark_controller_dirty(&self, inner: &mut InstanceInner, index: usize) {
        if let Some(controller) = inner.controllers.get_mut(index) {
            controller.set_dirty(true);
            inner.dirty_controllers = true;
        }
    }

    /// The play length in samples changed.
    pub fn set_sample_count(&self, samples: u64) {
        let mut inner = self.inner.lock();
        inner.sample_count = samples;
        inner.dirty_format = true;
        inner.dirty_controllers = true;
    }

    /// The host moved or rescaled playback time.
    pub fn play_time_changed(&self) {
        let mut inner = self.inner.lock();
        inner.dirty_format = true;
        inner.dirty_controllers = true;
    }

    /// Reinitialize the per-voice state of every compiled source.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        let Some(synthesizer) = inner.synthesizer.clone() else {
            return;
        };
        let guard = synthesizer.inner.lock();
        let state = &mut inner.state;
        // nothing built yet, or the definition moved on since the last
        // prepare: the next produce rebuilds fresh state anyway
        if state.is_empty() || state.len() != guard.compiled.state_size {
            return;
        }
        guard.cleanup_state_data(state);
        *state = new_state_table(guard.compiled.state_size);
        guard.init_state_data(state);
    }

    /// Rebuild whatever is dirty: definition, controllers, format. Called
    /// by produce; exposed so hosts can query the format up front.
    pub fn prepare(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let synthesizer = inner.synthesizer.clone();
        let mut guard = synthesizer.as_ref().map(|s| s.inner.lock());
        inner.prepare(guard.as_deref_mut())
    }

    /// Bytes per output sample frame (`bytes_per_sample x channels`),
    /// as of the last prepare.
    pub fn generate_sample_size(&self) -> usize {
        self.inner.lock().generate_sample_size
    }

    pub fn channel_count(&self) -> usize {
        self.inner.lock().channel_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.lock().sample_rate
    }

    pub fn bytes_per_sample(&self) -> usize {
        self.inner.lock().bytes_per_sample
    }

    /// Play length in samples, as set by the host.
    pub fn sample_count(&self) -> u64 {
        self.inner.lock().sample_count
    }

    /// Produce `samples` PCM sample frames at absolute timeline position
    /// `offset` into `buffer`.
    ///
    /// `buffer` must hold exactly `samples x generate_sample_size` bytes.
    /// Without a synthesizer, or with a silent one, the buffer is zeroed
    /// in the target integer format.
    pub fn produce(&self, buffer: &mut [u8], offset: u64, samples: usize) -> Result<()> {
        if samples == 0 {
            return Ok(());
        }

        let mut inner = self.inner.lock();
        let synthesizer = inner.synthesizer.clone();
        // held for the whole call so a concurrent recompile cannot
        // desynchronize compiled sources from this voice's state
        let mut guard = synthesizer.as_ref().map(|s| s.inner.lock());

        inner.prepare(guard.as_deref_mut())?;

        if buffer.len() != samples * inner.generate_sample_size {
            return Err(Error::InvalidArgument(format!(
                "buffer of {} bytes for {} samples of {} bytes",
                buffer.len(),
                samples,
                inner.generate_sample_size
            )));
        }

        let Some(guard) = guard.as_deref() else {
            write_silence(buffer);
            return Ok(());
        };
        if inner.silent {
            write_silence(buffer);
            return Ok(());
        }

        let mut mix_buffer = self.pool.claim(samples * inner.channel_count)?;
        mix_buffer.clear();

        inner.update_controller_values(samples, offset);

        let InstanceInner {
            controllers,
            state,
            channel_count,
            sample_rate,
            inv_sample_rate,
            ..
        } = &mut *inner;
        let view = InstanceView {
            channel_count: *channel_count,
            sample_rate: *sample_rate,
            inv_sample_rate: *inv_sample_rate,
            controllers,
        };
        guard.generate(&view, state, mix_buffer.as_mut_slice(), samples, &self.pool)?;

        write_pcm(mix_buffer.as_slice(), inner.bytes_per_sample, buffer);
        Ok(())
    }

    fn release_state(inner: &mut InstanceInner, synthesizer: Option<&Synthesizer>) {
        if inner.state.is_empty() {
            return;
        }
        if let Some(synthesizer) = synthesizer {
            let guard = synthesizer.inner.lock();
            // run the explicit teardown only while the layout still
            // matches; dropping the cells frees their state either way
            if inner.state.len() == guard.compiled.state_size {
                guard.cleanup_state_data(&mut inner.state);
            }
        }
        inner.state.clear();
    }
}

impl InstanceInner {
    fn prepare(&mut self, mut synthesizer: Option<&mut SynthInner>) -> Result<()> {
        if let Some(synth) = synthesizer.as_deref() {
            if synth.version != self.synthesizer_version {
                self.synthesizer_version = synth.version;
                self.dirty_synthesizer = true;
            }
        }

        if self.dirty_synthesizer {
            self.controllers.clear();

            if let Some(synth) = synthesizer.as_deref_mut() {
                // tear down against the old compiled graph before it is
                // replaced; skip if another voice already recompiled it
                if !self.state.is_empty() && self.state.len() == synth.compiled.state_size {
                    synth.cleanup_state_data(&mut self.state);
                }
                self.state.clear();

                synth.prepare()?;

                self.state = new_state_table(synth.compiled.state_size);
                synth.init_state_data(&mut self.state);

                // declared controllers seed any slot the voice has not
                // overridden yet
                let count = synth.desc.controllers.len();
                if self.controller_defs.len() < count {
                    let declared = synth.desc.controllers[self.controller_defs.len()..count].iter();
                    self.controller_defs.extend(declared.cloned());
                }
                self.controllers = self.controller_defs[..count]
                    .iter()
                    .map(Controller::new)
                    .collect();
            } else {
                self.state.clear();
            }

            self.dirty_synthesizer = false;
            self.dirty_controllers = false;
            self.dirty_format = true;
        }

        if self.dirty_controllers {
            for (controller, def) in self.controllers.iter_mut().zip(&self.controller_defs) {
                if controller.dirty() {
                    controller.update_from(def);
                }
            }
            self.dirty_controllers = false;
        }

        if self.dirty_format {
            self.update_format(synthesizer.as_deref());
            self.dirty_format = false;
        }

        Ok(())
    }

    fn update_format(&mut self, synthesizer: Option<&SynthInner>) {
        match synthesizer {
            Some(synth) => {
                self.channel_count = synth.desc.channel_count.clamp(1, 2) as usize;
                self.sample_rate = synth.desc.sample_rate.max(1);
                self.bytes_per_sample = synth.desc.bytes_per_sample.clamp(1, 2) as usize;
                self.silent = synth.compiled.silent;
            }
            None => {
                self.channel_count = 1;
                self.sample_rate = 11025;
                self.bytes_per_sample = 1;
                self.silent = true;
            }
        }

        self.inv_sample_rate = 1.0 / self.sample_rate as f32;
        self.generate_sample_size = self.bytes_per_sample * self.channel_count;
    }

    fn update_controller_values(&mut self, samples: usize, offset: u64) {
        let step = self.inv_sample_rate;
        for controller in &mut self.controllers {
            controller.update_values(samples, offset, step);
        }
    }
}
