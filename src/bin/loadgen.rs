//! Load generator: N concurrent clients doing pipelined round trips.

use clap::{Parser, ValueEnum};
use hazelfast::config::{BufferAllocation, ClientConfig};
use hazelfast::Client;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Send ping requests to a `structures` server.
    Ping,
    /// Send opaque payloads to an `echo` server.
    Echo,
}

#[derive(Parser, Debug)]
#[command(name = "loadgen")]
#[command(about = "Drive a hazelfast server with concurrent clients", long_about = None)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:1111")]
    address: String,

    /// Number of concurrent connections
    #[arg(short, long, default_value_t = 4)]
    connections: usize,

    /// Round trips per connection
    #[arg(short, long, default_value_t = 100_000)]
    requests: usize,

    /// Payload size in bytes (echo mode)
    #[arg(short = 's', long, default_value_t = 64)]
    payload_size: usize,

    /// Requests written before waiting for replies
    #[arg(short, long, default_value_t = 1)]
    pipeline: usize,

    #[arg(short, long, value_enum, default_value_t = Mode::Echo)]
    mode: Mode,

    /// Allocate scratch buffers lazily
    #[arg(long)]
    heap: bool,

    /// Disable buffer pooling
    #[arg(long)]
    no_pooling: bool,

    #[arg(long, default_value = "info")]
    log_level: String,
}

struct Outcome {
    round_trips: usize,
    elapsed: Duration,
    allocations: u64,
}

fn run_client(config: &ClientConfig, args: &Args) -> hazelfast::Result<Outcome> {
    let mut client = Client::connect(config)?;
    let (payload, expected_len) = match args.mode {
        Mode::Ping => (vec![0u8], 0),
        Mode::Echo => (vec![0xAB; args.payload_size], args.payload_size),
    };
    let pipeline = args.pipeline.max(1);

    let start = Instant::now();
    let mut done = 0;
    while done < args.requests {
        let batch = pipeline.min(args.requests - done);
        for _ in 0..batch {
            client.write(&payload)?;
        }
        client.flush()?;
        for _ in 0..batch {
            let reply = client.receive()?;
            if reply.len() != expected_len {
                return Err(hazelfast::ProtocolError::MalformedResponse("unexpected reply length").into());
            }
        }
        done += batch;
    }

    Ok(Outcome {
        round_trips: done,
        elapsed: start.elapsed(),
        allocations: client.allocations(),
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut config = ClientConfig::new(args.address.clone());
    if args.heap {
        config.buffers.allocation = BufferAllocation::Heap;
    }
    config.buffers.pooling = !args.no_pooling;

    info!(
        address = %args.address,
        connections = args.connections,
        requests = args.requests,
        payload_size = args.payload_size,
        pipeline = args.pipeline,
        mode = ?args.mode,
        "Starting load"
    );

    let start = Instant::now();
    let outcomes: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..args.connections)
            .map(|_| scope.spawn(|| run_client(&config, &args)))
            .collect();
        handles.into_iter().map(|h| h.join()).collect()
    });
    let wall = start.elapsed();

    let mut total = 0;
    for (client, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(Ok(outcome)) => {
                let secs = outcome.elapsed.as_secs_f64().max(f64::EPSILON);
                info!(
                    client,
                    round_trips = outcome.round_trips,
                    per_sec = (outcome.round_trips as f64 / secs) as u64,
                    allocations = outcome.allocations,
                    "Client finished"
                );
                total += outcome.round_trips;
            }
            Ok(Err(e)) => error!(client, error = %e, "Client failed"),
            Err(_) => error!(client, "Client thread panicked"),
        }
    }

    let secs = wall.as_secs_f64().max(f64::EPSILON);
    info!(
        round_trips = total,
        elapsed_ms = wall.as_millis() as u64,
        per_sec = (total as f64 / secs) as u64,
        "Load finished"
    );
    Ok(())
}
