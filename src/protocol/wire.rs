//! Field-level encoding shared by requests and responses.
//!
//! All integers are big-endian. Strings are a `u32` byte length followed by
//! UTF-8 bytes.

use crate::error::ProtocolError;
use bytes::{Buf, BufMut};

/// Bounds-checked cursor over a frame payload.
#[derive(Debug)]
pub struct WireReader<'a> {
    buf: &'a [u8],
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn ensure(&self, needed: usize) -> Result<(), ProtocolError> {
        if self.buf.remaining() < needed {
            return Err(ProtocolError::Truncated {
                needed,
                remaining: self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub fn u8(&mut self) -> Result<u8, ProtocolError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn u32(&mut self) -> Result<u32, ProtocolError> {
        self.ensure(4)?;
        Ok(self.buf.get_u32())
    }

    pub fn i64(&mut self) -> Result<i64, ProtocolError> {
        self.ensure(8)?;
        Ok(self.buf.get_i64())
    }

    /// Borrow a length-prefixed UTF-8 string from the payload.
    pub fn str(&mut self) -> Result<&'a str, ProtocolError> {
        let len = self.u32()? as usize;
        self.ensure(len)?;
        let (bytes, rest) = self.buf.split_at(len);
        self.buf = rest;
        std::str::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8)
    }

    /// Require that the whole payload has been consumed.
    pub fn finish(self) -> Result<(), ProtocolError> {
        match self.buf.len() {
            0 => Ok(()),
            n => Err(ProtocolError::TrailingBytes(n)),
        }
    }
}

/// Append a length-prefixed string.
pub fn put_str<B: BufMut>(out: &mut B, s: &str) {
    out.put_u32(s.len() as u32);
    out.put_slice(s.as_bytes());
}
