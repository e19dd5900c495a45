//! Module configuration.

use crate::{Error, Result};
use std::path::Path;

/// Default for [`Config::stream_buf_size_threshold`].
///
/// Chosen so short one-channel effect and voice samples (up to roughly
/// seven seconds at 44100 Hz / 16 bit) stay in memory while longer
/// material streams.
pub const DEFAULT_STREAM_BUF_SIZE_THRESHOLD: usize = 700_000;

/// Engine configuration, loaded once at init.
#[derive(Debug, Clone)]
pub struct Config {
    /// Total decoded bytes above which a one-channel sound asset is
    /// treated as streaming instead of held in memory.
    pub stream_buf_size_threshold: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stream_buf_size_threshold: DEFAULT_STREAM_BUF_SIZE_THRESHOLD,
        }
    }
}

impl Config {
    /// Load the configuration from a JSON property file.
    ///
    /// A missing file yields the defaults. Unknown properties log a warning
    /// and are ignored; a malformed file logs a warning and falls back to
    /// the defaults.
    pub fn load(path: &Path) -> Config {
        match Self::try_load(path) {
            Ok(config) => config,
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "failed reading config, using defaults");
                Config::default()
            }
        }
    }

    fn try_load(path: &Path) -> Result<Config> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let text = std::fs::read_to_string(path)?;
        let value: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| Error::InvalidArgument(format!("config parse: {e}")))?;
        let object = value
            .as_object()
            .ok_or_else(|| Error::InvalidArgument("config root must be an object".into()))?;

        let mut config = Config::default();
        for (name, value) in object {
            match name.as_str() {
                "streamBufSizeThreshold" => {
                    config.stream_buf_size_threshold = value.as_u64().ok_or_else(|| {
                        Error::InvalidArgument(format!("streamBufSizeThreshold: {value}"))
                    })? as usize;
                }
                _ => {
                    tracing::warn!(property = %name, "unknown config property ignored");
                }
            }
        }

        Ok(config)
    }
}
