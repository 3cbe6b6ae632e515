//! Accept loop distributing sockets across workers.

use super::worker::Handoff;
use crate::config::SocketOptions;
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token, Waker};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const LISTENER_TOKEN: Token = Token(0);
const WAKER_TOKEN: Token = Token(1);

/// Create a non-blocking listener with SO_REUSEADDR.
///
/// The receive buffer size is applied before `listen` so accepted sockets
/// inherit it.
pub fn bind_listener(addr: SocketAddr, receive_buffer_size: usize) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_recv_buffer_size(receive_buffer_size)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;

    Ok(socket.into())
}

pub struct Acceptor {
    poll: Poll,
    listener: TcpListener,
    handoffs: Vec<Arc<Handoff>>,
    next: usize,
    tcp_no_delay: bool,
    running: Arc<AtomicBool>,
}

impl Acceptor {
    /// Register `listener` on a fresh poll. The returned waker interrupts the
    /// accept loop for shutdown.
    pub fn new(
        listener: std::net::TcpListener,
        handoffs: Vec<Arc<Handoff>>,
        socket: &SocketOptions,
        running: Arc<AtomicBool>,
    ) -> io::Result<(Self, Arc<Waker>)> {
        if handoffs.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "no workers to accept for"));
        }

        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);
        let mut listener = TcpListener::from_std(listener);
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

        let acceptor = Self {
            poll,
            listener,
            handoffs,
            next: 0,
            tcp_no_delay: socket.tcp_no_delay,
            running,
        };
        Ok((acceptor, waker))
    }

    /// Accept until shutdown. The listener is closed when this returns.
    pub fn run(mut self) -> io::Result<()> {
        let mut events = Events::with_capacity(128);
        info!(workers = self.handoffs.len(), "Acceptor started");

        while self.running.load(Ordering::Acquire) {
            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(e);
            }

            for event in events.iter() {
                if event.token() == LISTENER_TOKEN {
                    self.accept_connections();
                }
            }
        }

        info!("Acceptor stopped");
        Ok(())
    }

    fn accept_connections(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer_addr)) => {
                    if self.tcp_no_delay {
                        if let Err(e) = stream.set_nodelay(true) {
                            warn!(peer = %peer_addr, error = %e, "Failed to set TCP_NODELAY");
                        }
                    }

                    let worker = self.next % self.handoffs.len();
                    self.next = self.next.wrapping_add(1);
                    if let Err(e) = self.handoffs[worker].push(stream) {
                        warn!(worker, error = %e, "Failed to wake worker");
                    }
                    debug!(worker, peer = %peer_addr, "Accepted connection");
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(error = %e, "Accept error");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_listener_ephemeral_port() {
        let listener = bind_listener("127.0.0.1:0".parse().unwrap(), 64 * 1024).unwrap();
        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        assert!(addr.ip().is_loopback());
    }

    #[test]
    fn test_acceptor_requires_workers() {
        let listener = bind_listener("127.0.0.1:0".parse().unwrap(), 64 * 1024).unwrap();
        let running = Arc::new(AtomicBool::new(true));
        let result = Acceptor::new(listener, Vec::new(), &SocketOptions::default(), running);
        assert!(result.is_err());
    }
}
