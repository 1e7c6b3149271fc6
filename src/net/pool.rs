//! Encode buffer pool
//!
//! Update messages are built into scratch buffers that are reused across
//! ticks. A [`PooledBuffer`] goes back to its pool when dropped, so every
//! exit path of an encode call (including `?` propagation) releases it.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::Mutex;

use super::buffer::PacketBuffer;

/// Initial capacity given to freshly allocated buffers
const DEFAULT_BUFFER_CAPACITY: usize = 4096;

#[derive(Debug)]
struct PoolInner {
    idle: Mutex<Vec<PacketBuffer>>,
    capacity: usize,
}

/// A bounded pool of reusable packet buffers
#[derive(Debug, Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    /// Create a pool that keeps at most `capacity` idle buffers
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                idle: Mutex::new(Vec::with_capacity(capacity)),
                capacity,
            }),
        }
    }

    /// Take a buffer from the pool, allocating if none are idle
    pub fn acquire(&self) -> PooledBuffer {
        let buffer = self
            .inner
            .idle
            .lock()
            .pop()
            .unwrap_or_else(|| PacketBuffer::with_capacity(DEFAULT_BUFFER_CAPACITY));
        PooledBuffer {
            buffer,
            pool: Arc::clone(&self.inner),
        }
    }

    /// Number of idle buffers waiting to be reused
    pub fn available(&self) -> usize {
        self.inner.idle.lock().len()
    }

    /// Maximum number of idle buffers retained
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(64)
    }
}

/// A buffer on loan from a [`BufferPool`]
#[derive(Debug)]
pub struct PooledBuffer {
    buffer: PacketBuffer,
    pool: Arc<PoolInner>,
}

impl Deref for PooledBuffer {
    type Target = PacketBuffer;

    fn deref(&self) -> &PacketBuffer {
        &self.buffer
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut PacketBuffer {
        &mut self.buffer
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.clear();
        let mut idle = self.pool.idle.lock();
        if idle.len() < self.pool.capacity {
            idle.push(buffer);
        }
    }
}
