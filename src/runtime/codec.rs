//! Length-prefixed frame assembly and disassembly.
//!
//! Shared by the server connections and the client. Both halves work on
//! fixed-size scratch buffers and resume from saved offsets, so a frame may be
//! split across any number of reads or writes.
//!
//! ## Inbound
//!
//! ```text
//! AwaitingLength --(4 bytes)--> AwaitingBody --(length bytes)--> Complete
//! ```
//!
//! ## Outbound
//!
//! Pending frames are staged into the send scratch (4-byte length, then as much
//! payload as fits) and written until the socket would block. A frame that
//! does not fit keeps its offset and is continued on the next flush.

use super::frame::{Frame, Pools};
use crate::config::BufferAllocation;
use crate::error::{Error, ProtocolError, Result};
use bytes::{Buf, BufMut};
use std::collections::VecDeque;
use std::io::{self, Read, Write};

/// Size of the big-endian length prefix.
pub const LENGTH_PREFIX: usize = 4;

/// Smallest usable scratch buffer.
const MIN_SCRATCH: usize = 2 * LENGTH_PREFIX;

/// Fixed-size scratch buffer, allocated eagerly or on first use.
#[derive(Debug)]
struct Scratch {
    buf: Vec<u8>,
    capacity: usize,
}

impl Scratch {
    fn new(capacity: usize, allocation: BufferAllocation) -> Self {
        let mut scratch = Self {
            buf: Vec::new(),
            capacity: capacity.max(MIN_SCRATCH),
        };
        if allocation == BufferAllocation::Direct {
            scratch.ensure();
        }
        scratch
    }

    fn ensure(&mut self) -> &mut [u8] {
        if self.buf.is_empty() {
            self.buf = vec![0u8; self.capacity];
        }
        &mut self.buf
    }
}

/// Result of a single read attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    /// Bytes were appended to the receive scratch.
    Read(usize),
    /// The source has nothing to offer right now.
    WouldBlock,
}

/// Inbound half: receive scratch plus the frame being assembled.
#[derive(Debug)]
pub struct FrameReader {
    scratch: Scratch,
    /// End of valid data in the scratch.
    filled: usize,
    /// Start of unconsumed data in the scratch.
    pos: usize,
    frame: Option<Box<Frame>>,
    offset: usize,
    max_frame_size: u32,
    pub(crate) reads: u64,
    pub(crate) bytes_in: u64,
    pub(crate) frames_in: u64,
}

impl FrameReader {
    pub fn new(capacity: usize, allocation: BufferAllocation, max_frame_size: u32) -> Self {
        Self {
            scratch: Scratch::new(capacity, allocation),
            filled: 0,
            pos: 0,
            frame: None,
            offset: 0,
            max_frame_size,
            reads: 0,
            bytes_in: 0,
            frames_in: 0,
        }
    }

    /// Perform one read from `source` into the receive scratch.
    ///
    /// End-of-stream is reported as [`Error::Closed`].
    pub fn read_from<R: Read>(&mut self, source: &mut R) -> Result<Fill> {
        self.compact();
        let filled = self.filled;
        let buf = self.scratch.ensure();
        debug_assert!(filled < buf.len(), "receive scratch full");

        loop {
            match source.read(&mut buf[filled..]) {
                Ok(0) => return Err(Error::Closed),
                Ok(n) => {
                    self.filled += n;
                    self.reads += 1;
                    self.bytes_in += n as u64;
                    return Ok(Fill::Read(n));
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Fill::WouldBlock),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Advance the state machine over buffered bytes.
    ///
    /// Returns the next complete frame, or `None` once every buffered byte has
    /// been consumed into the frame in progress (or fewer than 4 bytes of a
    /// length prefix remain).
    pub fn next_frame(&mut self, pools: &mut Pools) -> Result<Option<Box<Frame>>> {
        let frame = match self.frame.as_mut() {
            Some(frame) => frame,
            None => {
                if self.filled - self.pos < LENGTH_PREFIX {
                    self.compact();
                    return Ok(None);
                }
                let raw = (&self.scratch.buf[self.pos..self.pos + LENGTH_PREFIX]).get_i32();
                self.pos += LENGTH_PREFIX;

                if raw < 0 {
                    return Err(ProtocolError::NegativeLength(raw).into());
                }
                let len = raw as u32;
                if len > self.max_frame_size {
                    return Err(ProtocolError::FrameTooLarge {
                        len,
                        max: self.max_frame_size,
                    }
                    .into());
                }

                self.offset = 0;
                self.frame.insert(pools.frame(len as usize)?)
            }
        };

        let missing = frame.len() - self.offset;
        let available = self.filled - self.pos;
        let n = missing.min(available);
        frame.bytes_mut()[self.offset..self.offset + n]
            .copy_from_slice(&self.scratch.buf[self.pos..self.pos + n]);
        self.offset += n;
        self.pos += n;

        if self.offset == frame.len() {
            self.offset = 0;
            self.frames_in += 1;
            return Ok(self.frame.take());
        }

        self.compact();
        Ok(None)
    }

    /// Whether a frame is partially assembled or bytes are buffered.
    pub fn is_mid_frame(&self) -> bool {
        self.frame.is_some() || self.filled > self.pos
    }

    /// Return the frame in progress to the pools.
    pub fn release(&mut self, pools: &mut Pools) {
        if let Some(frame) = self.frame.take() {
            pools.recycle(frame);
        }
        self.offset = 0;
        self.filled = 0;
        self.pos = 0;
    }

    /// Move unconsumed bytes to the front of the scratch.
    fn compact(&mut self) {
        if self.pos == 0 {
            return;
        }
        if self.pos < self.filled {
            self.scratch.buf.copy_within(self.pos..self.filled, 0);
        }
        self.filled -= self.pos;
        self.pos = 0;
    }
}

/// Outbound half: pending queue, frame in progress and send scratch.
#[derive(Debug)]
pub struct FrameWriter {
    scratch: Scratch,
    /// Bytes staged in the scratch and not yet written.
    staged: usize,
    pending: VecDeque<Box<Frame>>,
    frame: Option<Box<Frame>>,
    offset: usize,
    pub(crate) writes: u64,
    pub(crate) bytes_out: u64,
    pub(crate) frames_out: u64,
}

impl FrameWriter {
    pub fn new(capacity: usize, allocation: BufferAllocation) -> Self {
        Self {
            scratch: Scratch::new(capacity, allocation),
            staged: 0,
            pending: VecDeque::new(),
            frame: None,
            offset: 0,
            writes: 0,
            bytes_out: 0,
            frames_out: 0,
        }
    }

    /// Queue a frame for sending.
    pub fn enqueue(&mut self, frame: Box<Frame>) {
        self.pending.push_back(frame);
    }

    /// Whether any output remains: queued, partially staged, or unwritten.
    pub fn has_pending(&self) -> bool {
        self.staged > 0 || self.frame.is_some() || !self.pending.is_empty()
    }

    /// Write as much as `sink` accepts.
    ///
    /// Returns `true` when everything has been written, `false` when the sink
    /// would block with output remaining.
    pub fn flush<W: Write>(&mut self, sink: &mut W, pools: &mut Pools) -> io::Result<bool> {
        loop {
            self.stage(pools);
            if self.staged == 0 {
                return Ok(true);
            }

            match sink.write(&self.scratch.buf[..self.staged]) {
                Ok(0) => {
                    return Err(io::Error::new(io::ErrorKind::WriteZero, "write returned 0"));
                }
                Ok(n) => {
                    self.writes += 1;
                    self.bytes_out += n as u64;
                    self.scratch.buf.copy_within(n..self.staged, 0);
                    self.staged -= n;
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Copy length prefixes and payload bytes into the free part of the scratch.
    fn stage(&mut self, pools: &mut Pools) {
        let capacity = self.scratch.capacity;
        loop {
            let frame = match self.frame.as_mut() {
                Some(frame) => frame,
                None => {
                    if capacity - self.staged < LENGTH_PREFIX {
                        return;
                    }
                    let Some(next) = self.pending.pop_front() else {
                        return;
                    };
                    let buf = self.scratch.ensure();
                    (&mut buf[self.staged..]).put_u32(next.len() as u32);
                    self.staged += LENGTH_PREFIX;
                    self.offset = 0;
                    self.frame.insert(next)
                }
            };

            let n = (frame.len() - self.offset).min(capacity - self.staged);
            self.scratch.buf[self.staged..self.staged + n]
                .copy_from_slice(&frame.bytes()[self.offset..self.offset + n]);
            self.staged += n;
            self.offset += n;

            if self.offset < frame.len() {
                return;
            }
            if let Some(done) = self.frame.take() {
                self.frames_out += 1;
                self.offset = 0;
                pools.recycle(done);
            }
        }
    }

    /// Return every queued and in-progress frame to the pools.
    pub fn release(&mut self, pools: &mut Pools) {
        if let Some(frame) = self.frame.take() {
            pools.recycle(frame);
        }
        while let Some(frame) = self.pending.pop_front() {
            pools.recycle(frame);
        }
        self.offset = 0;
        self.staged = 0;
    }
}

/// Encode one frame (length prefix plus payload) into `out`.
pub fn encode_frame(payload: &[u8], out: &mut Vec<u8>) {
    out.put_u32(payload.len() as u32);
    out.put_slice(payload);
}
