//! hazelfast server binary.
//!
//! Configuration via CLI arguments or a TOML file; see `--help`.

use hazelfast::{Config, Server};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        workers = config.workers,
        protocol = ?config.protocol,
        wait = ?config.wait,
        allocation = ?config.buffers.allocation,
        pooling = config.buffers.pooling,
        max_frame_size = config.buffers.max_frame_size,
        "Starting hazelfast server"
    );

    let server = Server::start(&config)?;
    info!(addr = %server.local_addr(), "Listening");
    server.join();
    Ok(())
}
