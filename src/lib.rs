//! hazelfast: a non-blocking, multi-threaded framed socket server and client.
//!
//! Messages are length-prefixed frames (`u32` big-endian length, then the
//! payload). The server runs one acceptor thread and a fixed set of I/O worker
//! threads; each worker owns its connections, buffer pools and data
//! structures outright.
//!
//! Services:
//! - `echo`: every frame is answered with an identical frame
//! - `structures`: frames carry requests for per-worker counter and string stores

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod runtime;
pub mod server;

pub use client::Client;
pub use config::{ClientConfig, Config};
pub use error::{Error, PoolError, ProtocolError, Result};
pub use server::Server;
