//! Per-connection state machine.
//!
//! A connection pairs a non-blocking stream with its inbound and outbound
//! frame state. Readiness handlers drive the socket until it would block and
//! report which interest the worker should register next.

use super::codec::{Fill, FrameReader, FrameWriter};
use super::frame::Pools;
use super::service::Service;
use crate::config::{BufferOptions, SocketOptions};
use crate::error::Result;
use mio::Interest;
use std::io::{Read, Write};

/// Traffic counters for one connection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConnStats {
    pub reads: u64,
    pub writes: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub frames_in: u64,
    pub frames_out: u64,
}

/// A single client connection.
#[derive(Debug)]
pub struct Connection<S> {
    stream: S,
    reader: FrameReader,
    writer: FrameWriter,
    /// Interest currently registered with the multiplexer.
    interest: Interest,
}

impl<S: Read + Write> Connection<S> {
    /// Create a connection registered for read-readiness only.
    pub fn new(stream: S, socket: &SocketOptions, buffers: &BufferOptions) -> Self {
        Self {
            stream,
            reader: FrameReader::new(
                socket.receive_buffer_size,
                buffers.allocation,
                buffers.max_frame_size,
            ),
            writer: FrameWriter::new(socket.send_buffer_size, buffers.allocation),
            interest: Interest::READABLE,
        }
    }

    /// Read until the socket would block, answering every completed frame.
    ///
    /// Replies are queued, not written. Returns the number of frames completed.
    pub fn on_readable<H: Service>(&mut self, pools: &mut Pools, service: &mut H) -> Result<usize> {
        let mut completed = 0;
        loop {
            match self.reader.read_from(&mut self.stream)? {
                Fill::WouldBlock => return Ok(completed),
                Fill::Read(_) => {
                    while let Some(request) = self.reader.next_frame(pools)? {
                        let reply = service.respond(request, pools)?;
                        self.writer.enqueue(reply);
                        completed += 1;
                    }
                }
            }
        }
    }

    /// Write queued replies until done or the socket would block.
    ///
    /// Returns `true` when nothing remains to be written.
    pub fn on_writable(&mut self, pools: &mut Pools) -> Result<bool> {
        Ok(self.writer.flush(&mut self.stream, pools)?)
    }

    /// Interest wanted for the current output state.
    pub fn desired_interest(&self) -> Interest {
        if self.writer.has_pending() {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        }
    }

    /// Record the desired interest, returning it when it differs from the
    /// registered one.
    pub fn update_interest(&mut self) -> Option<Interest> {
        let desired = self.desired_interest();
        if desired == self.interest {
            return None;
        }
        self.interest = desired;
        Some(desired)
    }

    /// Return all frames held by this connection to `pools`.
    pub fn release(&mut self, pools: &mut Pools) {
        self.reader.release(pools);
        self.writer.release(pools);
    }

    pub fn stats(&self) -> ConnStats {
        ConnStats {
            reads: self.reader.reads,
            writes: self.writer.writes,
            bytes_in: self.reader.bytes_in,
            bytes_out: self.writer.bytes_out,
            frames_in: self.reader.frames_in,
            frames_out: self.writer.frames_out,
        }
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }
}
