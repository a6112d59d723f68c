//! Reusable byte buffers shared across proxy sessions
//!
//! Two buffer classes are pooled:
//! - command buffers, small growable vectors used to assemble one command
//! - chunk buffers, fixed 32 KiB blocks used to relay one INSTREAM chunk
//!
//! A buffer is borrowed through a [`PooledBuffer`] guard and goes back to its
//! pool when the guard is dropped. The content of a returned buffer is dead:
//! command buffers are cleared on release, and chunk buffers are only ever
//! read up to the length that was just written into them.

use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, PoisonError};

/// Initial capacity of a command buffer (most commands are tiny)
pub const COMMAND_BUFFER_CAPACITY: usize = 256;

/// Size of a pooled chunk buffer
pub const CHUNK_BUFFER_SIZE: usize = 32 * 1024;

/// Command buffers that grew past this are dropped instead of pooled
const MAX_POOLED_COMMAND_CAPACITY: usize = 64 * 1024;

/// Default number of idle buffers kept per pool
const DEFAULT_MAX_IDLE: usize = 256;

/// Kind of buffer a pool hands out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferClass {
    /// Empty vector with room for a typical command
    Command,
    /// Zero-filled block of [`CHUNK_BUFFER_SIZE`] bytes
    Chunk,
}

impl BufferClass {
    fn allocate(self) -> Vec<u8> {
        match self {
            BufferClass::Command => Vec::with_capacity(COMMAND_BUFFER_CAPACITY),
            BufferClass::Chunk => vec![0u8; CHUNK_BUFFER_SIZE],
        }
    }

    /// Prepare a released buffer for reuse, or reject it
    fn recycle(self, mut buf: Vec<u8>) -> Option<Vec<u8>> {
        match self {
            BufferClass::Command => {
                if buf.capacity() > MAX_POOLED_COMMAND_CAPACITY {
                    return None;
                }
                buf.clear();
                Some(buf)
            }
            BufferClass::Chunk => {
                if buf.len() != CHUNK_BUFFER_SIZE {
                    return None;
                }
                Some(buf)
            }
        }
    }
}

/// Thread-safe free list of buffers of one class
#[derive(Debug)]
pub struct BufferPool {
    class: BufferClass,
    free: Mutex<Vec<Vec<u8>>>,
    max_idle: usize,
}

impl BufferPool {
    /// Create an empty pool for the given buffer class
    pub fn new(class: BufferClass) -> Self {
        Self::with_max_idle(class, DEFAULT_MAX_IDLE)
    }

    /// Create an empty pool that keeps at most `max_idle` released buffers
    pub fn with_max_idle(class: BufferClass, max_idle: usize) -> Self {
        Self {
            class,
            free: Mutex::new(Vec::new()),
            max_idle,
        }
    }

    /// Buffer class of this pool
    pub fn class(&self) -> BufferClass {
        self.class
    }

    /// Borrow a buffer, allocating a fresh one when the pool is empty
    pub fn acquire(&self) -> PooledBuffer<'_> {
        let reused = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        PooledBuffer {
            buf: reused.unwrap_or_else(|| self.class.allocate()),
            pool: self,
        }
    }

    /// Number of buffers currently waiting for reuse
    pub fn idle(&self) -> usize {
        self.free.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn release(&self, buf: Vec<u8>) {
        let Some(buf) = self.class.recycle(buf) else {
            return;
        };
        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        if free.len() < self.max_idle {
            free.push(buf);
        }
    }
}

/// A buffer borrowed from a [`BufferPool`]
///
/// Returned to the pool on drop.
#[derive(Debug)]
pub struct PooledBuffer<'a> {
    buf: Vec<u8>,
    pool: &'a BufferPool,
}

impl Deref for PooledBuffer<'_> {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.buf
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buf
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buf));
    }
}

/// The pools shared by every session of a proxy
#[derive(Debug)]
pub struct BufferPools {
    /// Pool for command assembly
    pub command: BufferPool,
    /// Pool for INSTREAM chunk payloads
    pub chunk: BufferPool,
}

impl BufferPools {
    pub fn new() -> Self {
        Self {
            command: BufferPool::new(BufferClass::Command),
            chunk: BufferPool::new(BufferClass::Chunk),
        }
    }
}

impl Default for BufferPools {
    fn default() -> Self {
        Self::new()
    }
}
