//! Sound assets: decoded PCM shared by synthesizer sources.

use crate::cache::SoundCache;
use crate::decode::{DecodeBuffer, DecoderFactory};
use ostinato_core::{sample16_to_f32, sample8_to_f32, Error, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Format and identity of a sound resource, supplied by the host's
/// decoder subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundInfo {
    pub path: String,
    pub channel_count: u32,
    pub bytes_per_sample: u32,
    pub sample_rate: u32,
    pub sample_count: u32,
}

impl SoundInfo {
    /// Total decoded size in bytes.
    pub fn pcm_byte_size(&self) -> usize {
        self.sample_count as usize * self.bytes_per_sample as usize * self.channel_count as usize
    }
}

/// Decoded PCM held in memory, typed by layout and width.
pub enum PcmData {
    Mono8(Vec<i8>),
    Mono16(Vec<i16>),
    Stereo8(Vec<[i8; 2]>),
    Stereo16(Vec<[i16; 2]>),
}

impl PcmData {
    /// Build from interleaved little-endian signed bytes.
    pub fn from_bytes(info: &SoundInfo, bytes: &[u8]) -> Result<PcmData> {
        if bytes.len() != info.pcm_byte_size() {
            return Err(Error::DecodeFailure(format!(
                "{}: decoded {} bytes, expected {}",
                info.path,
                bytes.len(),
                info.pcm_byte_size()
            )));
        }

        let data = match (info.channel_count, info.bytes_per_sample) {
            (1, 1) => PcmData::Mono8(bytes.iter().map(|&b| b as i8).collect()),
            (1, 2) => PcmData::Mono16(
                bytes
                    .chunks_exact(2)
                    .map(|c| i16::from_le_bytes([c[0], c[1]]))
                    .collect(),
            ),
            (2, 1) => PcmData::Stereo8(
                bytes
                    .chunks_exact(2)
                    .map(|c| [c[0] as i8, c[1] as i8])
                    .collect(),
            ),
            (2, 2) => PcmData::Stereo16(
                bytes
                    .chunks_exact(4)
                    .map(|c| {
                        [
                            i16::from_le_bytes([c[0], c[1]]),
                            i16::from_le_bytes([c[2], c[3]]),
                        ]
                    })
                    .collect(),
            ),
            (channels, width) => {
                return Err(Error::DecodeFailure(format!(
                    "{}: unsupported layout {channels}ch/{width}B",
                    info.path
                )))
            }
        };
        Ok(data)
    }

    /// Serialize back to interleaved little-endian signed bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            PcmData::Mono8(data) => data.iter().map(|&s| s as u8).collect(),
            PcmData::Mono16(data) => data.iter().flat_map(|s| s.to_le_bytes()).collect(),
            PcmData::Stereo8(data) => data.iter().flatten().map(|&s| s as u8).collect(),
            PcmData::Stereo16(data) => data
                .iter()
                .flatten()
                .flat_map(|s| s.to_le_bytes())
                .collect(),
        }
    }

    pub fn frame_count(&self) -> usize {
        match self {
            PcmData::Mono8(data) => data.len(),
            PcmData::Mono16(data) => data.len(),
            PcmData::Stereo8(data) => data.len(),
            PcmData::Stereo16(data) => data.len(),
        }
    }

    pub fn is_mono(&self) -> bool {
        matches!(self, PcmData::Mono8(_) | PcmData::Mono16(_))
    }

    /// Frame folded to one channel; stereo frames average left and right.
    #[inline]
    pub fn mono(&self, frame: usize) -> f32 {
        match self {
            PcmData::Mono8(data) => sample8_to_f32(data[frame]),
            PcmData::Mono16(data) => sample16_to_f32(data[frame]),
            PcmData::Stereo8(data) => {
                let [l, r] = data[frame];
                (sample8_to_f32(l) + sample8_to_f32(r)) * 0.5
            }
            PcmData::Stereo16(data) => {
                let [l, r] = data[frame];
                (sample16_to_f32(l) + sample16_to_f32(r)) * 0.5
            }
        }
    }

    /// Frame as a stereo pair; mono frames duplicate into both channels.
    #[inline]
    pub fn stereo(&self, frame: usize) -> (f32, f32) {
        match self {
            PcmData::Mono8(data) => {
                let v = sample8_to_f32(data[frame]);
                (v, v)
            }
            PcmData::Mono16(data) => {
                let v = sample16_to_f32(data[frame]);
                (v, v)
            }
            PcmData::Stereo8(data) => {
                let [l, r] = data[frame];
                (sample8_to_f32(l), sample8_to_f32(r))
            }
            PcmData::Stereo16(data) => {
                let [l, r] = data[frame];
                (sample16_to_f32(l), sample16_to_f32(r))
            }
        }
    }
}

/// Shared services every asset needs: the decoder factory, the decode
/// scratch, the cache and the streaming threshold.
pub struct SoundEnvironment {
    factory: Box<dyn DecoderFactory>,
    cache: Option<SoundCache>,
    decode_buffer: Mutex<DecodeBuffer>,
    stream_buf_size_threshold: AtomicUsize,
}

impl SoundEnvironment {
    pub fn new(
        factory: Box<dyn DecoderFactory>,
        cache: Option<SoundCache>,
        stream_buf_size_threshold: usize,
    ) -> Self {
        Self {
            factory,
            cache,
            // 100ms of 16-bit stereo at 44100 Hz
            decode_buffer: Mutex::new(DecodeBuffer::new((44100 / 10) * 4)),
            stream_buf_size_threshold: AtomicUsize::new(stream_buf_size_threshold),
        }
    }

    pub fn stream_buf_size_threshold(&self) -> usize {
        self.stream_buf_size_threshold.load(Ordering::Relaxed)
    }

    pub fn set_stream_buf_size_threshold(&self, threshold: usize) {
        self.stream_buf_size_threshold
            .store(threshold, Ordering::Relaxed);
    }
}

struct AssetState {
    used: bool,
    cached: bool,
    pcm: Option<Arc<PcmData>>,
}

/// A sound resource shared by synthesizer sources.
///
/// Immutable after [`SoundAsset::prepare`]. Construction decides between
/// in-memory and streaming from the decoded size and loads in-memory
/// assets (from the cache when it is still valid). Streaming assets
/// currently carry no PCM and render as silence.
pub struct SoundAsset {
    env: Option<Arc<SoundEnvironment>>,
    info: SoundInfo,
    valid: bool,
    streaming: bool,
    state: Mutex<AssetState>,
}

impl SoundAsset {
    /// Create an asset backed by the host's decoder subsystem.
    pub fn new(env: Arc<SoundEnvironment>, info: SoundInfo) -> Result<SoundAsset> {
        let valid = Self::determine_valid(&info);
        let streaming = valid && Self::determine_streaming(&env, &info);

        let asset = SoundAsset {
            env: Some(env),
            info,
            valid,
            streaming,
            state: Mutex::new(AssetState {
                used: false,
                cached: false,
                pcm: None,
            }),
        };
        if !asset.valid || asset.streaming {
            return Ok(asset);
        }

        {
            let mut state = asset.state.lock();
            asset.load_from_cache(&mut state);
            if !state.cached {
                // Most sounds are never used by a synthesizer; decode once,
                // cache as unused, and later runs skip the decode until a
                // synthesizer claims the sound.
                asset.load_entire(&mut state)?;
                asset.write_cache(&state);
            }
        }

        Ok(asset)
    }

    /// Create an asset from PCM the host already decoded. Never cached.
    pub fn from_pcm(info: SoundInfo, pcm: PcmData) -> SoundAsset {
        SoundAsset {
            env: None,
            valid: Self::determine_valid(&info),
            streaming: false,
            info,
            state: Mutex::new(AssetState {
                used: true,
                cached: false,
                pcm: Some(Arc::new(pcm)),
            }),
        }
    }

    pub fn info(&self) -> &SoundInfo {
        &self.info
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Decoded PCM, if loaded.
    pub fn pcm(&self) -> Option<Arc<PcmData>> {
        self.state.lock().pcm.clone()
    }

    /// Called when a synthesizer starts using the asset: marks it used,
    /// loads the PCM if the cache carried none, and rewrites the cache so
    /// the used flag persists across runs.
    pub fn prepare(&self) -> Result<()> {
        if !self.valid || self.streaming {
            return Ok(());
        }

        let mut state = self.state.lock();
        if state.used {
            return Ok(());
        }
        tracing::debug!(asset = %self.info.path, "marked used for the first time");

        if state.pcm.is_none() {
            self.load_entire(&mut state)?;
        }
        state.used = true;
        self.write_cache(&state);
        Ok(())
    }

    fn determine_valid(info: &SoundInfo) -> bool {
        if !matches!(info.bytes_per_sample, 1 | 2) {
            tracing::warn!(
                asset = %info.path,
                bytes_per_sample = info.bytes_per_sample,
                "unsupported sample width, only 1 or 2 bytes"
            );
            return false;
        }
        if !matches!(info.channel_count, 1 | 2) {
            tracing::warn!(
                asset = %info.path,
                channels = info.channel_count,
                "unsupported channel count, only 1 or 2"
            );
            return false;
        }
        true
    }

    fn determine_streaming(env: &SoundEnvironment, info: &SoundInfo) -> bool {
        // Two-channel data is music and always streams; one-channel data
        // stays in memory up to the configured threshold.
        info.channel_count > 1 || info.pcm_byte_size() > env.stream_buf_size_threshold()
    }

    fn load_entire(&self, state: &mut AssetState) -> Result<()> {
        if state.pcm.is_some() {
            return Ok(());
        }
        let env = self
            .env
            .as_ref()
            .ok_or_else(|| Error::NotFound(self.info.path.clone()))?;

        let size = self.info.pcm_byte_size();
        let mut decoder = env.factory.open(&self.info.path)?;
        let mut decode_buffer = env.decode_buffer.lock();
        decode_buffer.decode(decoder.as_mut(), size)?;
        state.pcm = Some(Arc::new(PcmData::from_bytes(
            &self.info,
            &decode_buffer.data()[..size],
        )?));
        Ok(())
    }

    fn load_from_cache(&self, state: &mut AssetState) {
        let Some(env) = self.env.as_ref() else {
            return;
        };
        let Some(cache) = env.cache.as_ref() else {
            return;
        };
        // Without a source file the cache key is no longer unique.
        let Some(modification_time) = env.factory.modification_time(&self.info.path) else {
            return;
        };
        let Some(entry) = cache.read(&self.info, modification_time) else {
            return;
        };

        if !entry.pcm.is_empty() {
            match PcmData::from_bytes(&self.info, &entry.pcm) {
                Ok(pcm) => state.pcm = Some(Arc::new(pcm)),
                Err(_) => {
                    cache.delete(&self.info.path);
                    return;
                }
            }
        }
        state.used = entry.used;
        state.cached = true;
    }

    fn write_cache(&self, state: &AssetState) {
        if !self.valid || self.streaming {
            return;
        }
        let Some(env) = self.env.as_ref() else {
            return;
        };
        let Some(cache) = env.cache.as_ref() else {
            return;
        };
        let Some(modification_time) = env.factory.modification_time(&self.info.path) else {
            return;
        };

        let pcm = match &state.pcm {
            Some(pcm) => pcm.to_bytes(),
            None => Vec::new(),
        };
        cache.write(&self.info, modification_time, state.used, &pcm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::WavDecoderFactory;
    use std::path::Path;

    fn write_wav(path: &Path, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &sample in samples {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn env(root: &Path, cache: Option<SoundCache>) -> Arc<SoundEnvironment> {
        Arc::new(SoundEnvironment::new(
            Box::new(WavDecoderFactory::new(root)),
            cache,
            700_000,
        ))
    }

    fn info(path: &str, samples: u32) -> SoundInfo {
        SoundInfo {
            path: path.into(),
            channel_count: 1,
            bytes_per_sample: 2,
            sample_rate: 44100,
            sample_count: samples,
        }
    }

    #[test]
    fn test_loads_on_construction() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("hit.wav"), &[100, -100, 200, -200]);

        let asset = SoundAsset::new(env(dir.path(), None), info("hit.wav", 4)).unwrap();
        assert!(asset.is_valid());
        assert!(!asset.is_streaming());
        let pcm = asset.pcm().unwrap();
        assert_eq!(pcm.frame_count(), 4);
        assert!((pcm.mono(2) - 200.0 / 32767.0).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_width_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let mut bad = info("hit.wav", 4);
        bad.bytes_per_sample = 3;
        let asset = SoundAsset::new(env(dir.path(), None), bad).unwrap();
        assert!(!asset.is_valid());
        assert!(asset.pcm().is_none());
    }

    #[test]
    fn test_stereo_streams() {
        let dir = tempfile::tempdir().unwrap();
        let mut stereo = info("music.wav", 4);
        stereo.channel_count = 2;
        let asset = SoundAsset::new(env(dir.path(), None), stereo).unwrap();
        assert!(asset.is_streaming());
        assert!(asset.pcm().is_none());
    }

    #[test]
    fn test_threshold_streams_large_assets() {
        let dir = tempfile::tempdir().unwrap();
        let environment = env(dir.path(), None);
        environment.set_stream_buf_size_threshold(6);
        let asset = SoundAsset::new(environment, info("hit.wav", 4)).unwrap();
        assert!(asset.is_streaming());
    }

    #[test]
    fn test_prepare_marks_used_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("hit.wav"), &[1, 2, 3, 4]);
        let cache_dir = dir.path().join("cache");

        {
            let cache = SoundCache::new(&cache_dir).unwrap();
            let asset = SoundAsset::new(env(dir.path(), Some(cache)), info("hit.wav", 4)).unwrap();
            asset.prepare().unwrap();
        }

        // second run: entry is valid, marked used, PCM comes from cache
        let cache = SoundCache::new(&cache_dir).unwrap();
        let asset = SoundAsset::new(env(dir.path(), Some(cache)), info("hit.wav", 4)).unwrap();
        let state = asset.state.lock();
        assert!(state.cached);
        assert!(state.used);
        assert_eq!(state.pcm.as_ref().unwrap().frame_count(), 4);
    }

    #[test]
    fn test_from_pcm() {
        let asset = SoundAsset::from_pcm(info("mem.raw", 2), PcmData::Mono16(vec![5, -5]));
        assert!(asset.is_valid());
        asset.prepare().unwrap();
        assert_eq!(asset.pcm().unwrap().frame_count(), 2);
    }
}
