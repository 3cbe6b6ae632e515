//! Services answering completed inbound frames.

use super::frame::{Frame, Pools};
use crate::config::Protocol;
use crate::error::Result;
use crate::protocol::Dispatcher;

/// Turns one complete request frame into one reply frame.
///
/// The request is owned by the service: it either reuses it as the reply or
/// recycles it into `pools`.
pub trait Service {
    fn respond(&mut self, request: Box<Frame>, pools: &mut Pools) -> Result<Box<Frame>>;
}

/// Replies with the request itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct Echo;

impl Service for Echo {
    fn respond(&mut self, request: Box<Frame>, _pools: &mut Pools) -> Result<Box<Frame>> {
        Ok(request)
    }
}

impl Service for Dispatcher {
    fn respond(&mut self, request: Box<Frame>, pools: &mut Pools) -> Result<Box<Frame>> {
        let reply = match self.dispatch(request.bytes()) {
            Ok(reply) => pools.frame_from(reply),
            Err(e) => {
                pools.recycle(request);
                return Err(e.into());
            }
        };
        pools.recycle(request);
        Ok(reply?)
    }
}

/// The service a worker runs, chosen by configuration.
#[derive(Debug)]
pub enum WorkerService {
    Echo(Echo),
    Structures(Dispatcher),
}

impl WorkerService {
    pub fn new(protocol: Protocol) -> Self {
        match protocol {
            Protocol::Echo => WorkerService::Echo(Echo),
            Protocol::Structures => WorkerService::Structures(Dispatcher::new()),
        }
    }
}

impl Service for WorkerService {
    fn respond(&mut self, request: Box<Frame>, pools: &mut Pools) -> Result<Box<Frame>> {
        match self {
            WorkerService::Echo(echo) => echo.respond(request, pools),
            WorkerService::Structures(dispatcher) => dispatcher.respond(request, pools),
        }
    }
}
