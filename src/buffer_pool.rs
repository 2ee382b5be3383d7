//! Tiered pool of reusable output buffers.
//!
//! Buffers are handed out by anticipated size class and returned on drop.
//! A returned buffer is always cleared; one that grew past the largest tier
//! is dropped instead of pooled. Holds no semantic state, so a single
//! process-wide pool may be shared by concurrent runs.

use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

/// Capacity classes, smallest first.
pub const TIERS: [usize; 3] = [4 * 1024, 64 * 1024, 1024 * 1024];

/// Idle buffers kept per tier.
const MAX_IDLE: usize = 16;

static GLOBAL: OnceLock<BufferPool> = OnceLock::new();

/// Process-wide pool.
pub fn global() -> &'static BufferPool {
    GLOBAL.get_or_init(BufferPool::new)
}

#[derive(Debug, Default)]
pub struct BufferPool {
    tiers: [Mutex<Vec<Vec<u8>>>; 3],
}

fn tier_for(size: usize) -> usize {
    TIERS
        .iter()
        .position(|&cap| size <= cap)
        .unwrap_or(TIERS.len() - 1)
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self, tier: usize) -> MutexGuard<'_, Vec<Vec<u8>>> {
        // a poisoned tier still holds valid, cleared buffers
        self.tiers[tier].lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Borrow an empty buffer with room for at least `size_hint` bytes, up to
    /// the largest tier.
    pub fn acquire(&self, size_hint: usize) -> PooledBuffer<'_> {
        let tier = tier_for(size_hint);
        let buf = self
            .lock(tier)
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(TIERS[tier]));
        PooledBuffer {
            pool: self,
            buf: Some(buf),
        }
    }

    fn release(&self, mut buf: Vec<u8>) {
        if buf.capacity() > TIERS[TIERS.len() - 1] {
            tracing::debug!(capacity = buf.capacity(), "dropping oversized buffer");
            return;
        }
        buf.clear();
        let tier = TIERS
            .iter()
            .rposition(|&cap| buf.capacity() >= cap)
            .unwrap_or(0);
        let mut idle = self.lock(tier);
        if idle.len() < MAX_IDLE {
            idle.push(buf);
        }
    }

    /// Idle buffers per tier.
    pub fn idle(&self) -> [usize; 3] {
        [self.lock(0).len(), self.lock(1).len(), self.lock(2).len()]
    }
}

/// A borrowed buffer; goes back to its pool on drop.
pub struct PooledBuffer<'a> {
    pool: &'a BufferPool,
    buf: Option<Vec<u8>>,
}

impl PooledBuffer<'_> {
    /// Take the contents, leaving an empty buffer to be returned.
    pub fn take(&mut self) -> Vec<u8> {
        let buf = self.buf.get_or_insert_with(Vec::new);
        let contents = buf.clone();
        buf.clear();
        contents
    }
}

impl Deref for PooledBuffer<'_> {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        // only `None` after drop has begun
        static EMPTY: Vec<u8> = Vec::new();
        self.buf.as_ref().unwrap_or(&EMPTY)
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        self.buf.get_or_insert_with(Vec::new)
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.release(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_returned_buffers_are_cleared() {
        let pool = BufferPool::new();
        {
            let mut buf = pool.acquire(10);
            buf.extend_from_slice(b"secret");
        }
        assert_eq!(pool.idle(), [1, 0, 0]);
        let buf = pool.acquire(10);
        assert!(buf.is_empty());
        assert!(buf.capacity() >= TIERS[0]);
    }

    #[test]
    fn test_size_classes() {
        let pool = BufferPool::new();
        drop(pool.acquire(100 * 1024));
        assert_eq!(pool.idle(), [0, 0, 1]);
        drop(pool.acquire(5000));
        assert_eq!(pool.idle(), [0, 1, 1]);
    }

    #[test]
    fn test_oversized_buffers_not_retained() {
        let pool = BufferPool::new();
        {
            let mut buf = pool.acquire(0);
            buf.reserve(2 * TIERS[2]);
            buf.push(b'x');
        }
        assert_eq!(pool.idle(), [0, 0, 0]);
    }

    #[test]
    fn test_take_leaves_buffer_empty() {
        let pool = BufferPool::new();
        let mut buf = pool.acquire(0);
        write!(buf, "{}-{}", "a", 1).unwrap();
        assert_eq!(buf.take(), b"a-1");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_concurrent_borrowers() {
        let pool = Arc::new(BufferPool::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    for _ in 0..50 {
                        let mut buf = pool.acquire(64);
                        assert!(buf.is_empty());
                        write!(buf, "worker {i}").unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(pool.idle()[0] <= MAX_IDLE);
    }
}
