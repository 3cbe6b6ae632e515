//! Non-blocking runtime for framed connections.
//!
//! Readiness-based I/O using mio (epoll on Linux, kqueue on macOS):
//! - `acceptor`: listening socket, round-robin handoff to workers
//! - `worker`: per-thread event loop owning its connections
//! - `connection`: per-socket read/write state machine
//! - `codec`: length-prefixed frame assembly over scratch buffers
//! - `frame` / `buffer`: pooled frame envelopes and power-of-two buffers
//! - `service`: what a worker answers each frame with

pub mod acceptor;
pub mod buffer;
pub mod codec;
pub mod connection;
pub mod frame;
pub mod service;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use buffer::{BufferPool, PooledBuf};
pub use codec::{FrameReader, FrameWriter};
pub use connection::{ConnStats, Connection};
pub use frame::{Frame, FramePool, Pools};
pub use service::{Echo, Service, WorkerService};
