//! Error types shared by the server runtime and the client.

use std::io;
use thiserror::Error;

/// Main error type for connection-level operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error on the underlying socket.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The peer violated the framing or request protocol.
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolError),

    /// Misuse of the buffer pool.
    #[error("buffer pool error: {0}")]
    Pool(#[from] PoolError),

    /// The peer closed the connection (read returned end-of-stream).
    #[error("connection closed by peer")]
    Closed,
}

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Protocol violations. Every variant is fatal for the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("frame length can't be negative, found {0}")]
    NegativeLength(i32),

    #[error("frame of length {len} exceeds the maximum of {max} bytes")]
    FrameTooLarge { len: u32, max: u32 },

    #[error("empty request")]
    EmptyRequest,

    #[error("unrecognized structure id {0}")]
    UnknownStructure(u8),

    #[error("unrecognized operation {operation} for structure {structure}")]
    UnknownOperation { structure: u8, operation: u8 },

    #[error("truncated request: needed {needed} more bytes, {remaining} left")]
    Truncated { needed: usize, remaining: usize },

    #[error("{0} unexpected trailing bytes after request")]
    TrailingBytes(usize),

    #[error("string field is not valid UTF-8")]
    InvalidUtf8,

    #[error("malformed response: {0}")]
    MalformedResponse(&'static str),
}

/// Buffer pool usage errors. These indicate programming errors, not peer misbehavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("buffer of length {0} is not a power of two")]
    NotPowerOfTwo(usize),

    #[error("no power-of-two size class can hold {0} bytes")]
    TooLarge(usize),
}
