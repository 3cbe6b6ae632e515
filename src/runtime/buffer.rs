//! Per-worker pooled buffer allocator.
//!
//! Buffers are bucketed into power-of-two size classes. A request for `n`
//! bytes is served from the smallest non-empty class that fits, falling back
//! to a fresh allocation of `n.next_power_of_two()` bytes. Returned buffers go
//! back to the free-list of their class, so steady-state traffic with a
//! stable size mix stops allocating altogether.
//!
//! A [`PooledBuf`] is a unique owning handle: `give` consumes it, so a buffer
//! can never be returned twice or used after being returned.

use crate::error::PoolError;
use std::ops::{Deref, DerefMut};

/// Number of size classes: one per bit of `usize`.
const SIZE_CLASSES: usize = usize::BITS as usize;

/// An owned byte buffer whose capacity is a power of two (or zero).
///
/// The empty buffer is the placeholder held by recycled frame envelopes and
/// never enters a free-list.
#[derive(Debug, Default)]
pub struct PooledBuf {
    bytes: Box<[u8]>,
}

impl PooledBuf {
    /// The empty placeholder buffer. Does not allocate.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Adopt an externally allocated buffer into the pooling discipline.
    ///
    /// Fails with [`PoolError::NotPowerOfTwo`] unless the length is a power of two.
    pub fn adopt(bytes: Box<[u8]>) -> Result<Self, PoolError> {
        if !bytes.len().is_power_of_two() {
            return Err(PoolError::NotPowerOfTwo(bytes.len()));
        }
        Ok(Self { bytes })
    }

    fn allocate(size: usize) -> Self {
        Self {
            bytes: vec![0u8; size].into_boxed_slice(),
        }
    }

    /// Capacity in bytes (the size class).
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    fn size_class(&self) -> usize {
        self.bytes.len().trailing_zeros() as usize
    }
}

impl Deref for PooledBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

/// Per-worker buffer pool with power-of-two size classes.
///
/// Not thread-safe: each worker (and each client) owns its own pool.
#[derive(Debug)]
pub struct BufferPool {
    /// LIFO free-lists indexed by `log2(capacity)`.
    classes: Vec<Vec<PooledBuf>>,
    /// When disabled, `take` always allocates and `give` drops.
    pooling: bool,
    /// Fresh allocations performed so far.
    allocations: u64,
}

impl BufferPool {
    /// Create an empty pool.
    pub fn new(pooling: bool) -> Self {
        Self {
            classes: (0..SIZE_CLASSES).map(|_| Vec::new()).collect(),
            pooling,
            allocations: 0,
        }
    }

    /// Take a buffer with capacity of at least `min_size` bytes.
    ///
    /// Pooled buffers are preferred over fresh allocation.
    pub fn take(&mut self, min_size: usize) -> Result<PooledBuf, PoolError> {
        let size = min_size
            .max(1)
            .checked_next_power_of_two()
            .ok_or(PoolError::TooLarge(min_size))?;

        if self.pooling {
            let class = size.trailing_zeros() as usize;
            for free in &mut self.classes[class..] {
                if let Some(buf) = free.pop() {
                    return Ok(buf);
                }
            }
        }

        self.allocations += 1;
        Ok(PooledBuf::allocate(size))
    }

    /// Return a buffer to its size-class free-list.
    pub fn give(&mut self, buf: PooledBuf) {
        if !self.pooling || buf.capacity() == 0 {
            return;
        }
        let class = buf.size_class();
        self.classes[class].push(buf);
    }

    /// Number of fresh allocations performed by `take`.
    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    /// Number of buffers currently held in free-lists.
    pub fn pooled(&self) -> usize {
        self.classes.iter().map(Vec::len).sum()
    }

    /// Whether pooling is enabled.
    pub fn pooling(&self) -> bool {
        self.pooling
    }
}
