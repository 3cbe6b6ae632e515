//! I/O worker event loop.
//!
//! Readiness-based model: each worker owns a `Poll`, the connections handed to
//! it and its own pools and service state. Accepted sockets arrive through a
//! lock-free queue; the acceptor wakes the worker after each push.

use super::connection::Connection;
use super::frame::Pools;
use super::service::WorkerService;
use crate::config::{BufferOptions, Config, SocketOptions, WaitStrategy};
use crossbeam_queue::SegQueue;
use mio::event::Event;
use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token, Waker};
use slab::Slab;
use socket2::SockRef;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const WAKER_TOKEN: Token = Token(usize::MAX);
const EVENTS_CAPACITY: usize = 1024;

/// Sockets handed from the acceptor to one worker.
#[derive(Debug)]
pub struct Handoff {
    queue: SegQueue<TcpStream>,
    waker: Waker,
}

impl Handoff {
    /// Queue a socket and wake the owning worker.
    pub fn push(&self, stream: TcpStream) -> io::Result<()> {
        self.queue.push(stream);
        self.waker.wake()
    }

    pub fn wake(&self) -> io::Result<()> {
        self.waker.wake()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

pub struct Worker {
    id: usize,
    poll: Poll,
    handoff: Arc<Handoff>,
    connections: Slab<Connection<TcpStream>>,
    pools: Pools,
    service: WorkerService,
    socket: SocketOptions,
    buffers: BufferOptions,
    wait: WaitStrategy,
    running: Arc<AtomicBool>,
}

impl Worker {
    pub fn new(id: usize, config: &Config, running: Arc<AtomicBool>) -> io::Result<Self> {
        let poll = Poll::new()?;
        let waker = Waker::new(poll.registry(), WAKER_TOKEN)?;
        let handoff = Arc::new(Handoff {
            queue: SegQueue::new(),
            waker,
        });

        Ok(Self {
            id,
            poll,
            handoff,
            connections: Slab::new(),
            pools: Pools::new(config.buffers.pooling),
            service: WorkerService::new(config.protocol),
            socket: config.socket,
            buffers: config.buffers,
            wait: config.wait,
            running,
        })
    }

    /// The queue the acceptor pushes this worker's sockets onto.
    pub fn handoff(&self) -> Arc<Handoff> {
        Arc::clone(&self.handoff)
    }

    /// Run until the shutdown flag is cleared.
    pub fn run(mut self) -> io::Result<()> {
        let mut events = Events::with_capacity(EVENTS_CAPACITY);
        info!(worker = self.id, wait = ?self.wait, "Worker started");

        while self.running.load(Ordering::Acquire) {
            if let Err(e) = self.wait(&mut events) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                self.shutdown();
                return Err(e);
            }

            self.accept_handoffs();

            for event in events.iter() {
                match event.token() {
                    WAKER_TOKEN => {}
                    Token(conn_id) => {
                        if let Err(e) = self.handle_event(conn_id, event) {
                            debug!(worker = self.id, conn_id, error = %e, "Connection error");
                            self.close_connection(conn_id);
                        }
                    }
                }
            }
        }

        self.shutdown();
        Ok(())
    }

    fn wait(&mut self, events: &mut Events) -> io::Result<()> {
        match self.wait {
            WaitStrategy::Block => self.poll.poll(events, None),
            WaitStrategy::BusyPoll => {
                self.poll.poll(events, Some(Duration::ZERO))?;
                if events.is_empty() {
                    std::hint::spin_loop();
                }
                Ok(())
            }
        }
    }

    /// Register every socket waiting in the handoff queue.
    fn accept_handoffs(&mut self) {
        while let Some(mut stream) = self.handoff.queue.pop() {
            let sock = SockRef::from(&stream);
            if let Err(e) = sock.set_recv_buffer_size(self.socket.receive_buffer_size) {
                warn!(worker = self.id, error = %e, "Failed to set receive buffer size");
            }
            if let Err(e) = sock.set_send_buffer_size(self.socket.send_buffer_size) {
                warn!(worker = self.id, error = %e, "Failed to set send buffer size");
            }

            let entry = self.connections.vacant_entry();
            let conn_id = entry.key();
            if let Err(e) = self
                .poll
                .registry()
                .register(&mut stream, Token(conn_id), Interest::READABLE)
            {
                warn!(worker = self.id, error = %e, "Failed to register connection");
                continue;
            }

            entry.insert(Connection::new(stream, &self.socket, &self.buffers));
            debug!(worker = self.id, conn_id, "Connection registered");
        }
    }

    fn handle_event(&mut self, conn_id: usize, event: &Event) -> crate::error::Result<()> {
        let Some(conn) = self.connections.get_mut(conn_id) else {
            return Ok(());
        };

        if event.is_readable() || event.is_read_closed() || event.is_error() {
            let completed = conn.on_readable(&mut self.pools, &mut self.service)?;
            if completed > 0 {
                conn.on_writable(&mut self.pools)?;
            }
        }

        if event.is_writable() {
            conn.on_writable(&mut self.pools)?;
        }

        if let Some(interest) = conn.update_interest() {
            self.poll
                .registry()
                .reregister(conn.stream_mut(), Token(conn_id), interest)?;
        }
        Ok(())
    }

    fn close_connection(&mut self, conn_id: usize) {
        if let Some(mut conn) = self.connections.try_remove(conn_id) {
            let _ = self.poll.registry().deregister(conn.stream_mut());
            conn.release(&mut self.pools);
            let stats = conn.stats();
            debug!(
                worker = self.id,
                conn_id,
                frames_in = stats.frames_in,
                frames_out = stats.frames_out,
                "Connection closed"
            );
        }
    }

    /// Drop every connection, returning its frames to the pools.
    fn shutdown(&mut self) {
        let open = self.connections.len();
        for mut conn in self.connections.drain() {
            let _ = self.poll.registry().deregister(conn.stream_mut());
            conn.release(&mut self.pools);
        }
        while self.handoff.queue.pop().is_some() {}
        info!(
            worker = self.id,
            closed = open,
            allocations = self.pools.allocations(),
            "Worker stopped"
        );
    }
}
