//! Fixed-capacity chunk pool backing all audio transfers
//!
//! Buffers are owned by the pool and loaned out as RAII guards. Returning
//! a buffer happens in `Drop`, so every acquisition is balanced by exactly
//! one release on every path, including error branches.

use crossbeam::queue::ArrayQueue;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Instant;

struct PoolInner {
    free: ArrayQueue<Box<[u8]>>,
    capacity: usize,
    chunk_bytes: usize,
}

/// Fixed-count, fixed-size buffer pool with a lock-free free list.
/// Cloning the handle shares the same pool.
#[derive(Clone)]
pub struct ChunkPool {
    inner: Arc<PoolInner>,
}

impl ChunkPool {
    /// Create a pool with `capacity` buffers of `chunk_bytes` each.
    /// All backing memory is allocated eagerly.
    pub fn new(capacity: usize, chunk_bytes: usize) -> Self {
        let free = ArrayQueue::new(capacity);
        for _ in 0..capacity {
            // The queue holds exactly `capacity` slots; these pushes cannot fail.
            let _ = free.push(vec![0u8; chunk_bytes].into_boxed_slice());
        }
        tracing::info!(capacity, chunk_bytes, "chunk pool initialized");
        Self {
            inner: Arc::new(PoolInner {
                free,
                capacity,
                chunk_bytes,
            }),
        }
    }

    /// Non-blocking acquire. `None` means the pool is exhausted, which is
    /// a recoverable condition: callers report it and back off, they do
    /// not treat it as fatal.
    pub fn acquire(&self) -> Option<PooledBuf> {
        match self.inner.free.pop() {
            Some(data) => Some(PooledBuf {
                data: Some(data),
                pool: self.clone(),
            }),
            None => {
                tracing::warn!("no free chunks available in pool");
                None
            }
        }
    }

    fn release(&self, data: Box<[u8]>) {
        // Only buffers born from this pool come back, one release per
        // guard, so the free list can never overflow.
        if self.inner.free.push(data).is_err() {
            tracing::error!("chunk returned to a full pool; dropping");
        }
    }

    /// Number of buffers currently in the free list.
    pub fn available(&self) -> usize {
        self.inner.free.len()
    }

    /// Total buffer count.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Size of each buffer in bytes.
    pub fn chunk_bytes(&self) -> usize {
        self.inner.chunk_bytes
    }
}

/// A pool buffer on loan. Returns itself to the pool when dropped.
pub struct PooledBuf {
    data: Option<Box<[u8]>>,
    pool: ChunkPool,
}

impl Deref for PooledBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.data.as_deref().expect("buffer present until drop")
    }
}

impl DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.data.as_deref_mut().expect("buffer present until drop")
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        if let Some(data) = self.data.take() {
            self.pool.release(data);
        }
    }
}

/// Fixed-size unit of audio moving through the pipeline.
///
/// Capture chunks carry a monotonically increasing sequence number;
/// playback-origin chunks carry 0.
pub struct AudioChunk {
    buf: PooledBuf,
    len: usize,
    seq: u32,
    captured_at: Instant,
}

impl AudioChunk {
    pub fn new(buf: PooledBuf, len: usize, seq: u32) -> Self {
        debug_assert!(len <= buf.len());
        Self {
            buf,
            len,
            seq,
            captured_at: Instant::now(),
        }
    }

    /// The valid portion of the buffer.
    pub fn payload(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn seq(&self) -> u32 {
        self.seq
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_exhaustion_and_reuse() {
        let pool = ChunkPool::new(4, 64);

        let mut held = Vec::new();
        for _ in 0..4 {
            held.push(pool.acquire().expect("pool should have free buffers"));
        }
        // Fifth acquire fails while all four are out.
        assert!(pool.acquire().is_none());

        // Releasing one makes the next acquire succeed.
        held.pop();
        assert!(pool.acquire().is_some());
    }

    #[test]
    fn test_release_on_every_path() {
        let pool = ChunkPool::new(2, 64);

        {
            let _a = pool.acquire().unwrap();
            let _b = pool.acquire().unwrap();
            assert_eq!(pool.available(), 0);
        }
        // Both guards dropped, both buffers back.
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_chunk_payload_respects_len() {
        let pool = ChunkPool::new(1, 64);
        let mut buf = pool.acquire().unwrap();
        buf[..4].copy_from_slice(&[1, 2, 3, 4]);

        let chunk = AudioChunk::new(buf, 4, 7);
        assert_eq!(chunk.payload(), &[1, 2, 3, 4]);
        assert_eq!(chunk.seq(), 7);

        drop(chunk);
        assert_eq!(pool.available(), 1);
    }

    proptest! {
        /// Pool conservation: free + in-flight == capacity after every
        /// operation, for arbitrary acquire/release sequences.
        #[test]
        fn prop_conservation(ops in proptest::collection::vec(any::<bool>(), 1..200)) {
            let capacity = 4;
            let pool = ChunkPool::new(capacity, 16);
            let mut held: Vec<PooledBuf> = Vec::new();

            for acquire in ops {
                if acquire {
                    if let Some(buf) = pool.acquire() {
                        held.push(buf);
                    }
                } else if !held.is_empty() {
                    held.pop();
                }
                prop_assert_eq!(pool.available() + held.len(), capacity);
            }
        }
    }
}
