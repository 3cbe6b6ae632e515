//! Blocking client speaking the same framing as the server.
//!
//! Messages can be pipelined with [`Client::write`] and [`Client::flush`];
//! [`Client::receive`] returns one reply at a time. The previous reply's frame
//! is recycled on every call, so a warm client does not allocate per message.

use crate::config::ClientConfig;
use crate::error::{Error, ProtocolError, Result};
use crate::protocol::counters::CounterOp;
use crate::protocol::strings::StringOp;
use crate::protocol::wire::WireReader;
use crate::protocol::Request;
use crate::runtime::codec::{Fill, FrameReader, FrameWriter};
use crate::runtime::{ConnStats, Frame, Pools};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};

pub struct Client {
    stream: TcpStream,
    reader: FrameReader,
    writer: FrameWriter,
    pools: Pools,
    /// The most recently received reply, recycled on the next receive.
    last: Option<Box<Frame>>,
    request: Vec<u8>,
}

impl Client {
    /// Connect using the configured socket and buffer options.
    pub fn connect(config: &ClientConfig) -> Result<Self> {
        let addr: SocketAddr = config
            .address
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "address did not resolve"))?;

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_recv_buffer_size(config.socket.receive_buffer_size)?;
        socket.set_send_buffer_size(config.socket.send_buffer_size)?;
        socket.set_nodelay(config.socket.tcp_no_delay)?;
        socket.connect(&addr.into())?;

        Ok(Self {
            stream: socket.into(),
            reader: FrameReader::new(
                config.socket.receive_buffer_size,
                config.buffers.allocation,
                config.buffers.max_frame_size,
            ),
            writer: FrameWriter::new(config.socket.send_buffer_size, config.buffers.allocation),
            pools: Pools::new(config.buffers.pooling),
            last: None,
            request: Vec::new(),
        })
    }

    /// Queue a message without sending it.
    pub fn write(&mut self, payload: &[u8]) -> Result<()> {
        let frame = self.pools.frame_from(payload)?;
        self.writer.enqueue(frame);
        Ok(())
    }

    /// Send every queued message.
    pub fn flush(&mut self) -> Result<()> {
        while !self.writer.flush(&mut self.stream, &mut self.pools)? {}
        Ok(())
    }

    /// Queue and send one message.
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.write(payload)?;
        self.flush()
    }

    /// Block until the next reply has arrived and return its bytes.
    pub fn receive(&mut self) -> Result<&[u8]> {
        if let Some(frame) = self.last.take() {
            self.pools.recycle(frame);
        }

        loop {
            if let Some(frame) = self.reader.next_frame(&mut self.pools)? {
                return Ok(self.last.insert(frame).bytes());
            }
            if let Fill::WouldBlock = self.reader.read_from(&mut self.stream)? {
                return Err(io::Error::from(io::ErrorKind::WouldBlock).into());
            }
        }
    }

    /// Send an encoded request and wait for its reply.
    fn call(&mut self, request: Request<'_>) -> Result<&[u8]> {
        self.request.clear();
        request.encode(&mut self.request);
        let frame = self.pools.frame_from(&self.request)?;
        self.writer.enqueue(frame);
        self.flush()?;
        self.receive()
    }

    pub fn ping(&mut self) -> Result<()> {
        if !self.call(Request::Ping)?.is_empty() {
            return Err(ProtocolError::MalformedResponse("ping reply is not empty").into());
        }
        Ok(())
    }

    pub fn counters(&mut self) -> Counters<'_> {
        Counters { client: self }
    }

    pub fn strings(&mut self) -> Strings<'_> {
        Strings { client: self }
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

    /// Fresh buffer and envelope allocations made by this client.
    pub fn allocations(&self) -> u64 {
        self.pools.allocations()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.stream.local_addr()
    }
}

fn flag(reply: &[u8]) -> Result<bool> {
    let mut reader = WireReader::new(reply);
    let value = reader.u8()?;
    reader.finish()?;
    match value {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(ProtocolError::MalformedResponse("flag is neither 0 nor 1").into()),
    }
}

fn long(reply: &[u8]) -> Result<i64> {
    let mut reader = WireReader::new(reply);
    let value = reader.i64()?;
    reader.finish()?;
    Ok(value)
}

fn acknowledged(reply: &[u8]) -> Result<()> {
    if flag(reply)? {
        Ok(())
    } else {
        Err(Error::Protocol(ProtocolError::MalformedResponse("operation not acknowledged")))
    }
}

/// Counter operations on the connected worker's store.
pub struct Counters<'a> {
    client: &'a mut Client,
}

impl Counters<'_> {
    pub fn get(&mut self, id: i64) -> Result<i64> {
        long(self.client.call(Request::Counters(CounterOp::Get { id }))?)
    }

    pub fn set(&mut self, id: i64, value: i64) -> Result<()> {
        acknowledged(self.client.call(Request::Counters(CounterOp::Set { id, value }))?)
    }

    pub fn increment(&mut self, id: i64, amount: i64) -> Result<i64> {
        long(self.client.call(Request::Counters(CounterOp::Increment { id, amount }))?)
    }

    /// Returns whether the swap happened.
    pub fn cas(&mut self, id: i64, expected: i64, new: i64) -> Result<bool> {
        flag(self.client.call(Request::Counters(CounterOp::Cas { id, expected, new }))?)
    }
}

/// String operations on the connected worker's store.
pub struct Strings<'a> {
    client: &'a mut Client,
}

impl Strings<'_> {
    pub fn get(&mut self, key: &str) -> Result<Option<String>> {
        let reply = self.client.call(Request::Strings(StringOp::Get { key }))?;
        let mut reader = WireReader::new(reply);
        let value = match reader.u8()? {
            0 => None,
            1 => Some(reader.str()?.to_owned()),
            _ => return Err(ProtocolError::MalformedResponse("presence flag is neither 0 nor 1").into()),
        };
        reader.finish()?;
        Ok(value)
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        acknowledged(self.client.call(Request::Strings(StringOp::Set { key, value }))?)
    }
}
