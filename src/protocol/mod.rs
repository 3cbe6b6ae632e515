//! Request protocol carried inside frames.
//!
//! ```text
//! payload := structure:u8 [operation:u8 fields...]
//! ```
//!
//! Structures:
//! - `0` ping: no operation, replies with an empty frame
//! - `1` counters: see [`counters`]
//! - `2` strings: see [`strings`]
//!
//! Anything unrecognized or malformed is a protocol violation and closes the
//! connection without a reply.

pub mod counters;
pub mod strings;
pub mod wire;

use crate::error::ProtocolError;
use bytes::BufMut;
use counters::{CounterOp, CounterStore};
use strings::{StringOp, StringStore};
use wire::WireReader;

/// Structure identifier, the first payload byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Structure {
    Ping = 0,
    Counters = 1,
    Strings = 2,
}

impl TryFrom<u8> for Structure {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Structure::Ping),
            1 => Ok(Structure::Counters),
            2 => Ok(Structure::Strings),
            other => Err(ProtocolError::UnknownStructure(other)),
        }
    }
}

/// A fully decoded request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    Ping,
    Counters(CounterOp),
    Strings(StringOp<'a>),
}

impl<'a> Request<'a> {
    /// Decode a complete request payload. Trailing bytes are rejected.
    pub fn decode(payload: &'a [u8]) -> Result<Self, ProtocolError> {
        let mut reader = WireReader::new(payload);
        let structure = match reader.u8() {
            Ok(id) => Structure::try_from(id)?,
            Err(_) => return Err(ProtocolError::EmptyRequest),
        };

        let request = match structure {
            Structure::Ping => Request::Ping,
            Structure::Counters => Request::Counters(CounterOp::decode(&mut reader)?),
            Structure::Strings => Request::Strings(StringOp::decode(&mut reader)?),
        };
        reader.finish()?;
        Ok(request)
    }

    pub fn structure(&self) -> Structure {
        match self {
            Request::Ping => Structure::Ping,
            Request::Counters(_) => Structure::Counters,
            Request::Strings(_) => Structure::Strings,
        }
    }

    pub fn encode<B: BufMut>(&self, out: &mut B) {
        out.put_u8(self.structure() as u8);
        match self {
            Request::Ping => {}
            Request::Counters(op) => op.encode(out),
            Request::Strings(op) => op.encode(out),
        }
    }
}

/// The data structures owned by one worker.
#[derive(Debug, Default)]
pub struct DataStructures {
    pub counters: CounterStore,
    pub strings: StringStore,
}

impl DataStructures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Execute a request, appending its reply to `out`.
    pub fn execute<B: BufMut>(&mut self, request: Request<'_>, out: &mut B) {
        match request {
            Request::Ping => {}
            Request::Counters(op) => self.counters.execute(op, out),
            Request::Strings(op) => self.strings.execute(op, out),
        }
    }
}

/// Decodes request frames and produces replies into a reused buffer.
#[derive(Debug, Default)]
pub struct Dispatcher {
    data: DataStructures,
    out: Vec<u8>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle one request payload, returning the reply payload.
    pub fn dispatch(&mut self, payload: &[u8]) -> Result<&[u8], ProtocolError> {
        let request = Request::decode(payload)?;
        self.out.clear();
        self.data.execute(request, &mut self.out);
        Ok(&self.out)
    }

    pub fn data(&self) -> &DataStructures {
        &self.data
    }
}
