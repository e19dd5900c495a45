//! Host-facing module surface.
//!
//! The host engine discovers the module through a factory returning an
//! [`OstinatoSystem`], then creates sound assets, synthesizer definitions
//! and voice instances through it. The system also carries the module
//! parameter surface and the debug command executer.

use ostinato_core::{Config, Error, Result, SharedBufferPool};
use ostinato_sound::{
    DecoderFactory, SoundAsset, SoundCache, SoundEnvironment, SoundInfo, WavDecoderFactory,
};
use ostinato_synth::{Synthesizer, SynthesizerInstance};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

/// Description of one module parameter.
pub struct ParameterInfo {
    pub name: &'static str,
    pub description: &'static str,
}

const PARAMETERS: &[ParameterInfo] = &[ParameterInfo {
    name: "streamBufSizeThreshold",
    description: "Total decoded bytes above which a one-channel sound \
                  asset streams instead of staying in memory",
}];

/// The synthesis module: shared services plus the factory surface.
pub struct OstinatoSystem {
    config: Mutex<Config>,
    pool: SharedBufferPool,
    sound_env: Arc<SoundEnvironment>,
}

impl OstinatoSystem {
    pub fn builder() -> OstinatoSystemBuilder {
        OstinatoSystemBuilder {
            root_dir: PathBuf::from("."),
            cache_dir: None,
            config_path: None,
            decoder: None,
        }
    }

    /// Create a shared sound asset for a host sound resource.
    pub fn create_sound_asset(&self, info: SoundInfo) -> Result<Arc<SoundAsset>> {
        Ok(Arc::new(SoundAsset::new(self.sound_env.clone(), info)?))
    }

    /// Create an empty synthesizer definition.
    pub fn create_synthesizer(&self) -> Arc<Synthesizer> {
        Arc::new(Synthesizer::new())
    }

    /// Create a voice, optionally bound to a definition.
    pub fn create_synthesizer_instance(
        &self,
        synthesizer: Option<Arc<Synthesizer>>,
    ) -> SynthesizerInstance {
        let instance = SynthesizerInstance::new(self.pool.clone());
        if synthesizer.is_some() {
            instance.set_synthesizer(synthesizer);
        }
        instance
    }

    /// The shared mix-buffer pool.
    pub fn pool(&self) -> &SharedBufferPool {
        &self.pool
    }

    pub fn parameters(&self) -> &'static [ParameterInfo] {
        PARAMETERS
    }

    /// Current value of a parameter by name.
    pub fn parameter(&self, name: &str) -> Result<String> {
        match name {
            "streamBufSizeThreshold" => {
                Ok(self.config.lock().stream_buf_size_threshold.to_string())
            }
            _ => Err(Error::InvalidArgument(format!("unknown parameter {name}"))),
        }
    }

    pub fn set_parameter(&self, name: &str, value: &str) -> Result<()> {
        match name {
            "streamBufSizeThreshold" => {
                let threshold: usize = value.parse().map_err(|_| {
                    Error::InvalidArgument(format!("streamBufSizeThreshold: {value}"))
                })?;
                self.config.lock().stream_buf_size_threshold = threshold;
                self.sound_env.set_stream_buf_size_threshold(threshold);
                Ok(())
            }
            _ => Err(Error::InvalidArgument(format!("unknown parameter {name}"))),
        }
    }

    /// Execute a debug command, answering as printable text.
    pub fn command(&self, command: &[&str]) -> String {
        match command.first() {
            None => "No command provided.".to_string(),
            Some(&"help") => "help => Displays this help screen.\n".to_string(),
            Some(other) => format!("Unknown command '{other}'."),
        }
    }
}

/// Builds an [`OstinatoSystem`], standing in for the host's module init.
pub struct OstinatoSystemBuilder {
    root_dir: PathBuf,
    cache_dir: Option<PathBuf>,
    config_path: Option<PathBuf>,
    decoder: Option<Box<dyn DecoderFactory>>,
}

impl OstinatoSystemBuilder {
    /// Directory sound asset paths resolve against.
    pub fn root_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.root_dir = dir.into();
        self
    }

    /// Directory for decoded-sound cache files. Without one, caching is
    /// disabled.
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Optional JSON configuration file.
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Replace the WAV default with the host's decoder subsystem.
    pub fn decoder(mut self, decoder: Box<dyn DecoderFactory>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn build(self) -> Result<OstinatoSystem> {
        let config = match &self.config_path {
            Some(path) => Config::load(path),
            None => Config::default(),
        };

        let cache = match &self.cache_dir {
            Some(dir) => Some(SoundCache::new(dir)?),
            None => None,
        };
        let decoder = self
            .decoder
            .unwrap_or_else(|| Box::new(WavDecoderFactory::new(&self.root_dir)));
        let sound_env = Arc::new(SoundEnvironment::new(
            decoder,
            cache,
            config.stream_buf_size_threshold,
        ));

        Ok(OstinatoSystem {
            config: Mutex::new(config),
            pool: SharedBufferPool::new(),
            sound_env,
        })
    }
}
