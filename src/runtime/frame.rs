//! Frame envelopes and their pool.
//!
//! A [`Frame`] is one length-prefixed message: a length plus a pooled payload
//! buffer of at least that capacity. Envelopes are boxed and recycled through
//! a [`FramePool`] so that neither the envelope nor the payload is allocated
//! per message once the pools are warm.

use super::buffer::{BufferPool, PooledBuf};
use crate::error::PoolError;
use std::collections::VecDeque;
use std::mem;

/// One complete length-prefixed message.
#[derive(Debug, Default)]
pub struct Frame {
    len: usize,
    payload: PooledBuf,
}

impl Frame {
    /// Message length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The message bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.payload[..self.len]
    }

    /// Mutable view of the message bytes, used while assembling.
    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.payload[..self.len]
    }
}

/// FIFO free-list of frame envelopes with empty payloads.
#[derive(Debug)]
pub struct FramePool {
    free: VecDeque<Box<Frame>>,
    pooling: bool,
    allocations: u64,
}

impl FramePool {
    pub fn new(pooling: bool) -> Self {
        Self {
            free: VecDeque::new(),
            pooling,
            allocations: 0,
        }
    }

    /// Take an envelope, reusing a pooled one when available.
    pub fn take(&mut self) -> Box<Frame> {
        if let Some(frame) = self.free.pop_front() {
            return frame;
        }
        self.allocations += 1;
        Box::default()
    }

    /// Return an envelope. Its payload must already have been detached.
    pub fn give(&mut self, frame: Box<Frame>) {
        debug_assert_eq!(frame.payload.capacity(), 0, "frame returned with payload");
        if self.pooling {
            self.free.push_back(frame);
        }
    }

    /// Number of fresh envelope allocations.
    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    /// Number of envelopes currently pooled.
    pub fn pooled(&self) -> usize {
        self.free.len()
    }
}

/// The buffer and envelope pools owned by one worker or client.
#[derive(Debug)]
pub struct Pools {
    pub buffers: BufferPool,
    pub frames: FramePool,
}

impl Pools {
    pub fn new(pooling: bool) -> Self {
        Self {
            buffers: BufferPool::new(pooling),
            frames: FramePool::new(pooling),
        }
    }

    /// Take a frame able to hold `len` bytes. The contents are unspecified.
    pub fn frame(&mut self, len: usize) -> Result<Box<Frame>, PoolError> {
        let payload = self.buffers.take(len)?;
        let mut frame = self.frames.take();
        frame.len = len;
        frame.payload = payload;
        Ok(frame)
    }

    /// Take a frame holding a copy of `bytes`.
    pub fn frame_from(&mut self, bytes: &[u8]) -> Result<Box<Frame>, PoolError> {
        let mut frame = self.frame(bytes.len())?;
        frame.bytes_mut().copy_from_slice(bytes);
        Ok(frame)
    }

    /// Return a frame's payload and envelope to their pools.
    pub fn recycle(&mut self, mut frame: Box<Frame>) {
        let payload = mem::take(&mut frame.payload);
        frame.len = 0;
        self.buffers.give(payload);
        self.frames.give(frame);
    }

    /// Total fresh allocations across both pools.
    pub fn allocations(&self) -> u64 {
        self.buffers.allocations() + self.frames.allocations()
    }
}
