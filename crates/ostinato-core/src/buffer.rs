//! Shared float-buffer pool for the produce hot path.

use crate::{Error, Result};
use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Process-wide pool of reusable `f32` mix buffers.
///
/// The pool is the only legal allocator on the produce hot path. Claiming
/// hands the caller exclusive ownership of a buffer at least as long as
/// requested; dropping the returned [`PooledBuffer`] releases it back,
/// including on error paths. Once the pool has grown to the peak concurrent
/// demand, claims stop allocating.
#[derive(Clone, Default)]
pub struct SharedBufferPool {
    inner: Arc<PoolInner>,
}

#[derive(Default)]
struct PoolInner {
    idle: Mutex<Vec<Vec<f32>>>,
    in_use: AtomicUsize,
}

impl SharedBufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a buffer of length `min_len`.
    ///
    /// Reuses an idle buffer when one exists, growing it in place if it is
    /// too short. Fails with [`Error::ResourceExhausted`] if growing would
    /// need an allocation the allocator cannot satisfy, before any state
    /// is mutated.
    pub fn claim(&self, min_len: usize) -> Result<PooledBuffer> {
        let mut data = self.inner.idle.lock().pop().unwrap_or_default();

        if data.len() < min_len {
            let grow = min_len - data.len();
            if data.try_reserve(grow).is_err() {
                self.inner.idle.lock().push(data);
                return Err(Error::ResourceExhausted(format!(
                    "buffer pool claim of {} floats",
                    min_len
                )));
            }
            data.resize(min_len, 0.0);
        }

        self.inner.in_use.fetch_add(1, Ordering::Relaxed);
        Ok(PooledBuffer {
            data,
            len: min_len,
            pool: Arc::clone(&self.inner),
        })
    }

    /// Number of buffers currently claimed.
    pub fn in_use(&self) -> usize {
        self.inner.in_use.load(Ordering::Relaxed)
    }

    /// Number of buffers currently idle in the pool.
    pub fn idle(&self) -> usize {
        self.inner.idle.lock().len()
    }
}

/// An exclusively owned buffer claimed from a [`SharedBufferPool`].
///
/// Dereferences to the `min_len` floats that were requested; the backing
/// allocation may be longer. Returns to the pool on drop.
pub struct PooledBuffer {
    data: Vec<f32>,
    len: usize,
    pool: Arc<PoolInner>,
}

impl PooledBuffer {
    pub fn as_slice(&self) -> &[f32] {
        &self.data[..self.len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data[..self.len]
    }

    /// Zero the claimed range.
    pub fn clear(&mut self) {
        self.data[..self.len].fill(0.0);
    }
}

impl Deref for PooledBuffer {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        self.as_slice()
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [f32] {
        self.as_mut_slice()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let data = std::mem::take(&mut self.data);
        self.pool.idle.lock().push(data);
        self.pool.in_use.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_release() {
        let pool = SharedBufferPool::new();
        let buffer = pool.claim(64).unwrap();
        assert_eq!(buffer.len(), 64);
        assert_eq!(pool.in_use(), 1);
        drop(buffer);
        assert_eq!(pool.in_use(), 0);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn test_reuses_idle_buffers() {
        let pool = SharedBufferPool::new();
        drop(pool.claim(128).unwrap());
        drop(pool.claim(32).unwrap());
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn test_grows_in_place() {
        let pool = SharedBufferPool::new();
        drop(pool.claim(16).unwrap());
        let buffer = pool.claim(256).unwrap();
        assert_eq!(buffer.len(), 256);
    }

    #[test]
    fn test_concurrent_claims_get_distinct_buffers() {
        let pool = SharedBufferPool::new();
        let mut a = pool.claim(8).unwrap();
        let mut b = pool.claim(8).unwrap();
        a.fill(1.0);
        b.fill(2.0);
        assert_eq!(a[0], 1.0);
        assert_eq!(b[0], 2.0);
        assert_eq!(pool.in_use(), 2);
    }

    #[test]
    fn test_clear() {
        let pool = SharedBufferPool::new();
        let mut buffer = pool.claim(8).unwrap();
        buffer.fill(3.0);
        drop(buffer);
        let mut buffer = pool.claim(8).unwrap();
        buffer.clear();
        assert!(buffer.iter().all(|&x| x == 0.0));
    }
}
