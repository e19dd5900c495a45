//! On-disk cache of decoded sound assets.
//!
//! One binary file per asset, keyed by the asset path, little-endian:
//!
//! | offset | size | field |
//! |---|---|---|
//! | 0 | 8 | source file modification time (unix microseconds) |
//! | 8 | 1 | cache format version |
//! | 9 | 1 | flags (bit 0: asset used by at least one synthesizer) |
//! | 10 | 1 | bytes per sample |
//! | 11 | 1 | channel count |
//! | 12 | 4 | sample count |
//! | 16 | 4 | sample rate |
//! | 20 | 4 | PCM size in bytes |
//! | 24 | .. | raw PCM, exactly PCM-size bytes (omitted when 0) |
//!
//! Any mismatch against the live asset deletes the entry and decoding
//! starts over; the cache is strictly an accelerator.

use crate::asset::SoundInfo;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};

// Increment when the layout changes; old entries are discarded on sight.
const CACHE_VERSION: u8 = 0;

const FLAG_IS_USED: u8 = 0x1;

const HEADER_SIZE: usize = 24;

// Entries claiming more PCM than this are treated as corrupt.
const MAX_PCM_BYTES: u32 = 10_000_000;

/// Cached state of one asset.
pub struct CacheEntry {
    pub used: bool,
    pub pcm: Vec<u8>,
}

/// Per-asset binary cache files below one directory.
pub struct SoundCache {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl SoundCache {
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<SoundCache> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(SoundCache {
            dir,
            lock: Mutex::new(()),
        })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir.join(format!("{}.snd", hex::encode(digest)))
    }

    /// Read the entry for `info`, validating it against the live asset.
    ///
    /// Returns `None` when the entry is absent or was discarded for any
    /// mismatch (modification time, version, asset parameters, impossible
    /// PCM size, short file).
    pub fn read(&self, info: &SoundInfo, modification_time: u64) -> Option<CacheEntry> {
        let path = self.entry_path(&info.path);
        let _guard = self.lock.lock();

        match self.read_validated(&path, info, modification_time) {
            Ok(entry) => entry,
            Err(reason) => {
                tracing::debug!(asset = %info.path, %reason, "cache discarded");
                let _ = std::fs::remove_file(&path);
                None
            }
        }
    }

    fn read_validated(
        &self,
        path: &Path,
        info: &SoundInfo,
        modification_time: u64,
    ) -> std::result::Result<Option<CacheEntry>, String> {
        let mut file = match std::fs::File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.to_string()),
        };

        let mut header = [0u8; HEADER_SIZE];
        file.read_exact(&mut header).map_err(|e| e.to_string())?;

        let filetime = u64::from_le_bytes(header[0..8].try_into().unwrap());
        let version = header[8];
        let flags = header[9];
        let bytes_per_sample = header[10] as u32;
        let channel_count = header[11] as u32;
        let sample_count = u32::from_le_bytes(header[12..16].try_into().unwrap());
        let sample_rate = u32::from_le_bytes(header[16..20].try_into().unwrap());
        let pcm_size = u32::from_le_bytes(header[20..24].try_into().unwrap());

        if filetime != modification_time {
            return Err("modification time changed".into());
        }
        if version != CACHE_VERSION {
            return Err("cache version changed".into());
        }
        if bytes_per_sample != info.bytes_per_sample
            || channel_count != info.channel_count
            || sample_count != info.sample_count
            || sample_rate != info.sample_rate
        {
            return Err("asset parameters mismatch".into());
        }
        if pcm_size > MAX_PCM_BYTES {
            return Err(format!("implausible PCM size {pcm_size}"));
        }
        if pcm_size != 0 && pcm_size != info.pcm_byte_size() as u32 {
            return Err("PCM size disagrees with asset parameters".into());
        }

        let mut pcm = vec![0u8; pcm_size as usize];
        file.read_exact(&mut pcm).map_err(|e| e.to_string())?;

        Ok(Some(CacheEntry {
            used: flags & FLAG_IS_USED != 0,
            pcm,
        }))
    }

    /// Write or replace the entry for `info`. Failures delete the entry
    /// and are logged; caching is never load-bearing.
    pub fn write(&self, info: &SoundInfo, modification_time: u64, used: bool, pcm: &[u8]) {
        let path = self.entry_path(&info.path);
        let _guard = self.lock.lock();

        let mut data = Vec::with_capacity(HEADER_SIZE + pcm.len());
        data.extend_from_slice(&modification_time.to_le_bytes());
        data.push(CACHE_VERSION);
        data.push(if used { FLAG_IS_USED } else { 0 });
        data.push(info.bytes_per_sample as u8);
        data.push(info.channel_count as u8);
        data.extend_from_slice(&info.sample_count.to_le_bytes());
        data.extend_from_slice(&info.sample_rate.to_le_bytes());
        data.extend_from_slice(&(pcm.len() as u32).to_le_bytes());
        data.extend_from_slice(pcm);

        if let Err(error) = std::fs::write(&path, &data) {
            tracing::warn!(asset = %info.path, %error, "failed writing cache entry");
            let _ = std::fs::remove_file(&path);
        }
    }

    /// Remove the entry for the given asset path, if present.
    pub fn delete(&self, asset_path: &str) {
        let _guard = self.lock.lock();
        let _ = std::fs::remove_file(self.entry_path(asset_path));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> SoundInfo {
        SoundInfo {
            path: "/sound/step.wav".into(),
            channel_count: 1,
            bytes_per_sample: 2,
            sample_rate: 44100,
            sample_count: 4,
        }
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SoundCache::new(dir.path()).unwrap();
        let pcm = [1u8, 0, 2, 0, 3, 0, 4, 0];

        cache.write(&info(), 777, true, &pcm);
        let entry = cache.read(&info(), 777).unwrap();
        assert!(entry.used);
        assert_eq!(entry.pcm, pcm);
    }

    #[test]
    fn test_used_flag_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SoundCache::new(dir.path()).unwrap();

        cache.write(&info(), 1, false, &[0; 8]);
        assert!(!cache.read(&info(), 1).unwrap().used);
    }

    #[test]
    fn test_modification_time_mismatch_discards() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SoundCache::new(dir.path()).unwrap();

        cache.write(&info(), 10, true, &[0; 8]);
        assert!(cache.read(&info(), 11).is_none());
        // entry was deleted, not just rejected
        assert!(cache.read(&info(), 10).is_none());
    }

    #[test]
    fn test_parameter_mismatch_discards() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SoundCache::new(dir.path()).unwrap();

        cache.write(&info(), 5, true, &[0; 8]);
        let mut other = info();
        other.sample_rate = 22050;
        assert!(cache.read(&other, 5).is_none());
    }

    #[test]
    fn test_truncated_file_discards() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SoundCache::new(dir.path()).unwrap();

        cache.write(&info(), 5, true, &[0; 8]);
        let path = cache.entry_path(&info().path);
        let data = std::fs::read(&path).unwrap();
        std::fs::write(&path, &data[..10]).unwrap();
        assert!(cache.read(&info(), 5).is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SoundCache::new(dir.path()).unwrap();

        cache.write(&info(), 5, true, &[0; 8]);
        cache.delete(&info().path);
        assert!(cache.read(&info(), 5).is_none());
    }
}
