// src/core/utils/bytepool.rs

//! A size-tiered pool of reusable byte buffers for the streaming hot path.
//! Buffers return to their tier on drop, so early returns in the cache-read
//! pipeline cannot leak them.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Buffer sizes per tier, smallest first.
const TIER_SIZES: [usize; 3] = [16 * 1024, 64 * 1024, 256 * 1024];

/// Maximum number of idle buffers retained per tier.
const TIER_CAPACITY: usize = 64;

static SHARED_POOL: Lazy<Arc<BufferPool>> = Lazy::new(|| Arc::new(BufferPool::new()));

pub struct BufferPool {
    tiers: Vec<Mutex<Vec<Vec<u8>>>>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self {
            tiers: TIER_SIZES.iter().map(|_| Mutex::new(Vec::new())).collect(),
        }
    }

    /// The process-wide pool used by the request path.
    pub fn shared() -> Arc<BufferPool> {
        SHARED_POOL.clone()
    }

    /// Borrows a buffer large enough to stream a payload of `hint` bytes in
    /// chunks. Payloads larger than the biggest tier still get the biggest
    /// tier; they are simply streamed in more chunks.
    pub fn get(self: &Arc<Self>, hint: usize) -> PooledBuf {
        let tier = TIER_SIZES
            .iter()
            .position(|&s| hint <= s)
            .unwrap_or(TIER_SIZES.len() - 1);
        let buf = self.tiers[tier]
            .lock()
            .pop()
            .unwrap_or_else(|| vec![0u8; TIER_SIZES[tier]]);
        PooledBuf {
            buf: Some(buf),
            tier,
            pool: self.clone(),
        }
    }

    fn put(&self, tier: usize, buf: Vec<u8>) {
        let mut tier_pool = self.tiers[tier].lock();
        if tier_pool.len() < TIER_CAPACITY {
            tier_pool.push(buf);
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

/// A buffer borrowed from a [`BufferPool`]. Dereferences to `[u8]`.
pub struct PooledBuf {
    buf: Option<Vec<u8>>,
    tier: usize,
    pool: Arc<BufferPool>,
}

impl Deref for PooledBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.put(self.tier, buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_picks_smallest_sufficient_tier() {
        let pool = Arc::new(BufferPool::new());
        assert_eq!(pool.get(1).len(), 16 * 1024);
        assert_eq!(pool.get(20 * 1024).len(), 64 * 1024);
        assert_eq!(pool.get(10 * 1024 * 1024).len(), 256 * 1024);
    }

    #[test]
    fn test_buffer_returns_to_pool_on_drop() {
        let pool = Arc::new(BufferPool::new());
        {
            let _buf = pool.get(1);
            assert!(pool.tiers[0].lock().is_empty());
        }
        assert_eq!(pool.tiers[0].lock().len(), 1);
    }
}
