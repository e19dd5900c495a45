//! Decoded-sample interface and the WAV-backed default decoder.
//!
//! The engine consumes decoded PCM through [`SoundDecoder`]; the host
//! registers a [`DecoderFactory`] for whatever compressed formats it
//! supports. [`WavDecoderFactory`] ships as the default so assets, the
//! cache and the tests can run against real files.

use ostinato_core::{Error, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Streaming source of interleaved little-endian signed PCM bytes.
pub trait SoundDecoder: Send {
    /// Read up to `out.len()` bytes, returning the number of bytes
    /// written. Returns 0 at end of stream.
    fn read_samples(&mut self, out: &mut [u8]) -> Result<usize>;
}

/// Creates decoders for asset paths.
pub trait DecoderFactory: Send + Sync {
    /// Open a decoder for the given asset path.
    fn open(&self, path: &str) -> Result<Box<dyn SoundDecoder>>;

    /// Modification time of the backing file in microseconds since the
    /// unix epoch, or `None` when the file does not exist.
    fn modification_time(&self, path: &str) -> Option<u64>;
}

/// Decoder factory reading WAV files below a root directory.
pub struct WavDecoderFactory {
    root: PathBuf,
}

impl WavDecoderFactory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl DecoderFactory for WavDecoderFactory {
    fn open(&self, path: &str) -> Result<Box<dyn SoundDecoder>> {
        let file_path = self.resolve(path);
        if !file_path.exists() {
            return Err(Error::NotFound(path.to_string()));
        }
        Ok(Box::new(WavDecoder::open(&file_path)?))
    }

    fn modification_time(&self, path: &str) -> Option<u64> {
        let metadata = std::fs::metadata(self.resolve(path)).ok()?;
        let modified = metadata.modified().ok()?;
        let since_epoch = modified.duration_since(UNIX_EPOCH).ok()?;
        Some(since_epoch.as_micros() as u64)
    }
}

/// WAV file decoder on `hound`, yielding 8 or 16 bit signed samples.
pub struct WavDecoder {
    reader: hound::WavReader<BufReader<File>>,
    bits_per_sample: u16,
}

impl WavDecoder {
    pub fn open(path: &Path) -> Result<Self> {
        let reader = hound::WavReader::open(path)
            .map_err(|e| Error::DecodeFailure(format!("{}: {e}", path.display())))?;
        let spec = reader.spec();

        if spec.sample_format != hound::SampleFormat::Int
            || !matches!(spec.bits_per_sample, 8 | 16)
        {
            return Err(Error::DecodeFailure(format!(
                "{}: only 8/16 bit integer WAV supported",
                path.display()
            )));
        }

        Ok(Self {
            reader,
            bits_per_sample: spec.bits_per_sample,
        })
    }
}

impl SoundDecoder for WavDecoder {
    fn read_samples(&mut self, out: &mut [u8]) -> Result<usize> {
        let mut written = 0;

        if self.bits_per_sample == 8 {
            let mut samples = self.reader.samples::<i8>();
            while written < out.len() {
                match samples.next() {
                    Some(Ok(sample)) => {
                        out[written] = sample as u8;
                        written += 1;
                    }
                    Some(Err(e)) => return Err(Error::DecodeFailure(e.to_string())),
                    None => break,
                }
            }
        } else {
            let mut samples = self.reader.samples::<i16>();
            while written + 2 <= out.len() {
                match samples.next() {
                    Some(Ok(sample)) => {
                        out[written..written + 2].copy_from_slice(&sample.to_le_bytes());
                        written += 2;
                    }
                    Some(Err(e)) => return Err(Error::DecodeFailure(e.to_string())),
                    None => break,
                }
            }
        }

        Ok(written)
    }
}

/// Reusable decode scratch shared by whole-file asset loads.
pub struct DecodeBuffer {
    data: Vec<u8>,
}

impl DecodeBuffer {
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0; size],
        }
    }

    /// Decode `size` bytes into the scratch, zero-filling whatever the
    /// decoder could not deliver. Returns the number of bytes decoded.
    pub fn decode(&mut self, decoder: &mut dyn SoundDecoder, size: usize) -> Result<usize> {
        if size > self.data.len() {
            self.data.resize(size, 0);
        }

        let mut total = 0;
        while total < size {
            let read = decoder.read_samples(&mut self.data[total..size])?;
            if read == 0 {
                break;
            }
            total += read;
        }

        self.data[total..size].fill(0);
        Ok(total)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ShortDecoder {
        remaining: usize,
    }

    impl SoundDecoder for ShortDecoder {
        fn read_samples(&mut self, out: &mut [u8]) -> Result<usize> {
            let n = out.len().min(self.remaining).min(3);
            out[..n].fill(0x55);
            self.remaining -= n;
            Ok(n)
        }
    }

    #[test]
    fn test_decode_zero_fills_tail() {
        let mut buffer = DecodeBuffer::new(4);
        let mut decoder = ShortDecoder { remaining: 10 };
        let read = buffer.decode(&mut decoder, 16).unwrap();
        assert_eq!(read, 10);
        assert!(buffer.data()[..10].iter().all(|&b| b == 0x55));
        assert!(buffer.data()[10..16].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_wav_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..64i16 {
            writer.write_sample(i * 100).unwrap();
        }
        writer.finalize().unwrap();

        let factory = WavDecoderFactory::new(dir.path());
        let mut decoder = factory.open("tone.wav").unwrap();
        let mut bytes = vec![0u8; 128];
        assert_eq!(decoder.read_samples(&mut bytes).unwrap(), 128);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), 100);
        assert!(factory.modification_time("tone.wav").is_some());
        assert!(factory.modification_time("absent.wav").is_none());
    }
}
