// Bounded pool of reusable pixel buffers.
//
// All buffers are allocated up front at one resolution so the capture hot
// path never allocates. When every buffer is outstanding, `acquire` fails
// with `PoolExhausted` and the caller drops the frame; the producer is never
// blocked, which keeps frame pacing intact under load.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

use crate::error::RecordError;

/// Bytes per pixel for 32-bit BGRA.
pub const BYTES_PER_PIXEL: usize = 4;

/// A raw image frame at the pool's fixed resolution (32-bit BGRA).
#[derive(Debug)]
pub struct PixelBuffer {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl PixelBuffer {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bytes_per_row(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

#[derive(Debug)]
struct PoolInner {
    free: Mutex<Vec<Vec<u8>>>,
    width: u32,
    height: u32,
    capacity: usize,
}

/// Fixed-capacity pool of pre-allocated BGRA buffers.
///
/// A buffer is never handed to two producers at once: each successful
/// `acquire` moves a distinct allocation out of the free list, and the
/// returned guard hands it back exactly once on drop.
#[derive(Debug, Clone)]
pub struct PixelBufferPool {
    inner: Arc<PoolInner>,
}

impl PixelBufferPool {
    pub fn new(width: u32, height: u32, capacity: usize) -> Result<Self, RecordError> {
        if width == 0 || height == 0 {
            return Err(RecordError::Config(format!(
                "invalid pool resolution {}x{}",
                width, height
            )));
        }
        if capacity == 0 {
            return Err(RecordError::Config("pool capacity must be at least 1".into()));
        }

        let frame_size = width as usize * height as usize * BYTES_PER_PIXEL;
        let free = (0..capacity).map(|_| vec![0u8; frame_size]).collect();

        Ok(Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(free),
                width,
                height,
                capacity,
            }),
        })
    }

    /// Takes a buffer out of the pool, or fails with `PoolExhausted` when all
    /// buffers are outstanding. Never blocks.
    pub fn acquire(&self) -> Result<PooledBuffer, RecordError> {
        let data = {
            let mut free = self.inner.free.lock().unwrap();
            free.pop().ok_or(RecordError::PoolExhausted)?
        };

        Ok(PooledBuffer {
            buffer: Some(PixelBuffer {
                data,
                width: self.inner.width,
                height: self.inner.height,
            }),
            pool: Arc::clone(&self.inner),
        })
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of buffers currently checked out.
    pub fn outstanding(&self) -> usize {
        self.inner.capacity - self.inner.free.lock().unwrap().len()
    }
}

/// A buffer checked out of the pool. Returns its storage on drop, so release
/// happens exactly once per acquire on every code path.
#[derive(Debug)]
pub struct PooledBuffer {
    buffer: Option<PixelBuffer>,
    pool: Arc<PoolInner>,
}

impl Deref for PooledBuffer {
    type Target = PixelBuffer;

    fn deref(&self) -> &PixelBuffer {
        self.buffer.as_ref().expect("buffer present until drop")
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut PixelBuffer {
        self.buffer.as_mut().expect("buffer present until drop")
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            let mut free = self.pool.free.lock().unwrap();
            free.push(buffer.data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_and_release_round_trip() {
        let pool = PixelBufferPool::new(4, 4, 2).unwrap();

        let buf = pool.acquire().unwrap();
        assert_eq!(buf.data().len(), 4 * 4 * BYTES_PER_PIXEL);
        assert_eq!(pool.outstanding(), 1);

        drop(buf);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn exhaustion_fails_instead_of_blocking() {
        let pool = PixelBufferPool::new(2, 2, 2).unwrap();

        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert!(matches!(pool.acquire(), Err(RecordError::PoolExhausted)));

        drop(a);
        let c = pool.acquire().unwrap();
        assert!(matches!(pool.acquire(), Err(RecordError::PoolExhausted)));

        drop(b);
        drop(c);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn outstanding_never_exceeds_capacity() {
        let pool = PixelBufferPool::new(2, 2, 3);
        let pool = pool.unwrap();

        let mut held = Vec::new();
        for _ in 0..10 {
            if let Ok(buf) = pool.acquire() {
                held.push(buf);
            }
            assert!(pool.outstanding() <= pool.capacity());
        }
        assert_eq!(held.len(), 3);
    }

    #[test]
    fn rejects_zero_sized_configuration() {
        assert!(PixelBufferPool::new(0, 4, 1).is_err());
        assert!(PixelBufferPool::new(4, 4, 0).is_err());
    }
}
