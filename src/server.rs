//! Server lifecycle: binds the listener, spawns the acceptor and the I/O
//! workers, and stops them again.

use crate::config::Config;
use crate::runtime::acceptor::{bind_listener, Acceptor};
use crate::runtime::worker::{Handoff, Worker};
use mio::Waker;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{error, info, warn};

/// A running server.
///
/// Dropping the server shuts it down and joins every thread.
pub struct Server {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    acceptor_waker: Option<Arc<Waker>>,
    handoffs: Vec<Arc<Handoff>>,
    threads: Vec<JoinHandle<()>>,
}

impl Server {
    /// Bind the configured address and start serving.
    pub fn start(config: &Config) -> io::Result<Self> {
        config
            .validate()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let addr = config
            .listen
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "listen address did not resolve"))?;
        let listener = bind_listener(addr, config.socket.receive_buffer_size)?;

        let mut server = Server {
            local_addr: listener.local_addr()?,
            running: Arc::new(AtomicBool::new(true)),
            acceptor_waker: None,
            handoffs: Vec::with_capacity(config.workers),
            threads: Vec::with_capacity(config.workers + 1),
        };

        for worker_id in 0..config.workers {
            let worker = Worker::new(worker_id, config, Arc::clone(&server.running))?;
            server.handoffs.push(worker.handoff());

            let handle = thread::Builder::new()
                .name(format!("worker-{worker_id}"))
                .spawn(move || {
                    if let Err(e) = worker.run() {
                        error!(worker = worker_id, error = %e, "Worker failed");
                    }
                })?;
            server.threads.push(handle);
        }

        let (acceptor, waker) = Acceptor::new(
            listener,
            server.handoffs.clone(),
            &config.socket,
            Arc::clone(&server.running),
        )?;
        server.acceptor_waker = Some(waker);

        let handle = thread::Builder::new()
            .name("acceptor".to_string())
            .spawn(move || {
                if let Err(e) = acceptor.run() {
                    error!(error = %e, "Acceptor failed");
                }
            })?;
        server.threads.push(handle);

        info!(
            addr = %server.local_addr,
            workers = config.workers,
            protocol = ?config.protocol,
            wait = ?config.wait,
            "Server started"
        );
        Ok(server)
    }

    /// The bound address, with the actual port when configured with port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, close every connection and join all threads.
    pub fn shutdown(mut self) {
        self.stop();
    }

    /// Block until the server threads exit.
    pub fn join(mut self) {
        self.join_threads();
    }

    fn stop(&mut self) {
        if self.running.swap(false, Ordering::AcqRel) {
            if let Some(waker) = &self.acceptor_waker {
                if let Err(e) = waker.wake() {
                    warn!(error = %e, "Failed to wake acceptor");
                }
            }
            for (worker, handoff) in self.handoffs.iter().enumerate() {
                if let Err(e) = handoff.wake() {
                    warn!(worker, error = %e, "Failed to wake worker");
                }
            }
            info!(addr = %self.local_addr, "Server stopping");
        }
        self.join_threads();
    }

    fn join_threads(&mut self) {
        for handle in self.threads.drain(..) {
            let name = handle.thread().name().unwrap_or("unnamed").to_string();
            if handle.join().is_err() {
                error!(thread = %name, "Server thread panicked");
            }
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            listen: "127.0.0.1:0".to_string(),
            workers: 2,
            ..Config::default()
        }
    }

    #[test]
    fn test_start_binds_ephemeral_port() {
        let server = Server::start(&config()).unwrap();
        assert_ne!(server.local_addr().port(), 0);
        server.shutdown();
    }

    #[test]
    fn test_shutdown_closes_listener() {
        let server = Server::start(&config()).unwrap();
        let addr = server.local_addr();
        server.shutdown();
        assert!(std::net::TcpStream::connect(addr).is_err());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = Config {
            workers: 0,
            ..config()
        };
        let err = Server::start(&config).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
