//! In-memory stand-ins for non-blocking sockets.

use std::collections::VecDeque;
use std::io::{self, Read, Write};

/// Delivers a fixed sequence of chunks, one per `read` at most, then EOF.
///
/// With `would_block` set, an exhausted reader reports `WouldBlock` instead
/// of end-of-stream until more chunks are pushed.
#[derive(Debug, Default)]
pub struct ChunkedReader {
    chunks: VecDeque<Vec<u8>>,
    pub would_block: bool,
}

impl ChunkedReader {
    pub fn new(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks: chunks.into_iter().filter(|c| !c.is_empty()).collect(),
            would_block: false,
        }
    }

    pub fn push(&mut self, chunk: Vec<u8>) {
        if !chunk.is_empty() {
            self.chunks.push_back(chunk);
        }
    }
}

impl Read for ChunkedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(chunk) = self.chunks.front_mut() else {
            if self.would_block {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            return Ok(0);
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        chunk.drain(..n);
        if chunk.is_empty() {
            self.chunks.pop_front();
        }
        Ok(n)
    }
}

/// Accepts at most `budget` bytes, then reports `WouldBlock` until replenished.
#[derive(Debug, Default)]
pub struct ThrottledWriter {
    budget: usize,
    pub written: Vec<u8>,
}

impl ThrottledWriter {
    pub fn new(budget: usize) -> Self {
        Self {
            budget,
            written: Vec::new(),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(usize::MAX)
    }

    pub fn replenish(&mut self, budget: usize) {
        self.budget = budget;
    }
}

impl Write for ThrottledWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.budget == 0 {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = self.budget.min(buf.len());
        self.written.extend_from_slice(&buf[..n]);
        self.budget -= n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A duplex socket built from the two halves above.
#[derive(Debug, Default)]
pub struct MockStream {
    pub input: ChunkedReader,
    pub output: ThrottledWriter,
}

impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.input.read(buf)
    }
}

impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.output.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
