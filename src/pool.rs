// Per-purpose byte buffer reuse pools with scoped acquisition.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

/// Buffers kept per pool; extra returns are dropped
const MAX_RETAINED: usize = 64;

#[derive(Debug)]
struct PoolInner {
    buffers: Mutex<Vec<Vec<u8>>>,
    capacity: usize,
}

/// A pool of byte buffers sharing one nominal capacity
///
/// Cloning a pool yields another handle to the same free list.
#[derive(Debug, Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                buffers: Mutex::new(Vec::new()),
                capacity,
            }),
        }
    }

    /// Take an empty buffer with at least the pool's capacity reserved
    ///
    /// The buffer returns to the pool when the guard drops, on every exit path.
    pub fn acquire(&self) -> PooledBuffer {
        let recycled = match self.inner.buffers.lock() {
            Ok(mut free) => free.pop(),
            Err(poisoned) => poisoned.into_inner().pop(),
        };
        let buf = recycled.unwrap_or_else(|| Vec::with_capacity(self.inner.capacity));
        PooledBuffer {
            buf: Some(buf),
            pool: Arc::clone(&self.inner),
        }
    }

    /// Number of idle buffers currently held
    pub fn idle(&self) -> usize {
        match self.inner.buffers.lock() {
            Ok(free) => free.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }
}

/// Exclusive handle to a pooled buffer
#[derive(Debug)]
pub struct PooledBuffer {
    buf: Option<Vec<u8>>,
    pool: Arc<PoolInner>,
}

impl Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        // Only None during drop.
        self.buf.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        self.buf.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(mut buf) = self.buf.take() {
            buf.clear();
            let mut free = match self.pool.buffers.lock() {
                Ok(free) => free,
                Err(poisoned) => poisoned.into_inner(),
            };
            if free.len() < MAX_RETAINED {
                free.push(buf);
            }
        }
    }
}

/// The pools one processor draws from, keyed by purpose
#[derive(Debug, Clone)]
pub struct BufferPools {
    /// Raw read buffers, one chunk each
    pub chunk: BufferPool,
    /// Normalization scratch: normalized tokens awaiting the writer
    pub token: BufferPool,
    /// Raw token bytes packed into parallel jobs
    pub batch: BufferPool,
}

impl BufferPools {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk: BufferPool::new(chunk_size),
            token: BufferPool::new(chunk_size),
            batch: BufferPool::new(chunk_size),
        }
    }
}
