//! Configuration for the hazelfast server and client.
//!
//! Supports both command-line arguments and a TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

/// Service answering completed frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Protocol {
    /// Every frame is answered with a byte-identical frame.
    Echo,
    /// Frames are dispatched to the counter and string stores.
    Structures,
}

/// How an I/O worker waits on its multiplexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum WaitStrategy {
    /// Block in `poll` until an event or wake-up arrives.
    Block,
    /// Poll with a zero timeout and spin when idle.
    BusyPoll,
}

/// How per-connection scratch buffers are allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum BufferAllocation {
    /// Allocated and touched up front when the connection is created.
    Direct,
    /// Allocated on first use.
    Heap,
}

/// Command-line arguments for the server
#[derive(Parser, Debug, Default)]
#[command(name = "hazelfast")]
#[command(version = "0.1.0")]
#[command(about = "A non-blocking framed socket server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 0.0.0.0:1111)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Number of I/O worker threads (defaults to max(4, cores / 2))
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Service answering frames
    #[arg(short = 'p', long, value_enum)]
    pub protocol: Option<Protocol>,

    /// Worker wait strategy
    #[arg(long, value_enum)]
    pub wait: Option<WaitStrategy>,

    /// Socket receive buffer size in bytes
    #[arg(long)]
    pub receive_buffer_size: Option<usize>,

    /// Socket send buffer size in bytes
    #[arg(long)]
    pub send_buffer_size: Option<usize>,

    /// Enable TCP_NODELAY
    #[arg(long)]
    pub tcp_no_delay: Option<bool>,

    /// Scratch buffer allocation
    #[arg(long, value_enum)]
    pub allocation: Option<BufferAllocation>,

    /// Enable buffer and frame pooling
    #[arg(long)]
    pub pooling: Option<bool>,

    /// Maximum accepted frame length in bytes
    #[arg(long)]
    pub max_frame_size: Option<u32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub socket: SocketSection,
    #[serde(default)]
    pub buffers: BufferSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,
    pub workers: Option<usize>,
    #[serde(default = "default_protocol")]
    pub protocol: Protocol,
    #[serde(default = "default_wait")]
    pub wait: WaitStrategy,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            workers: None,
            protocol: default_protocol(),
            wait: default_wait(),
        }
    }
}

/// Socket tuning
#[derive(Debug, Deserialize)]
pub struct SocketSection {
    #[serde(default = "default_socket_buffer_size")]
    pub receive_buffer_size: usize,
    #[serde(default = "default_socket_buffer_size")]
    pub send_buffer_size: usize,
    #[serde(default = "default_true")]
    pub tcp_no_delay: bool,
}

impl Default for SocketSection {
    fn default() -> Self {
        Self {
            receive_buffer_size: default_socket_buffer_size(),
            send_buffer_size: default_socket_buffer_size(),
            tcp_no_delay: true,
        }
    }
}

/// Buffer management
#[derive(Debug, Deserialize)]
pub struct BufferSection {
    #[serde(default = "default_allocation")]
    pub allocation: BufferAllocation,
    #[serde(default = "default_true")]
    pub pooling: bool,
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: u32,
}

impl Default for BufferSection {
    fn default() -> Self {
        Self {
            allocation: default_allocation(),
            pooling: true,
            max_frame_size: default_max_frame_size(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:1111".to_string()
}

fn default_protocol() -> Protocol {
    Protocol::Structures
}

fn default_wait() -> WaitStrategy {
    WaitStrategy::Block
}

fn default_socket_buffer_size() -> usize {
    256 * 1024
}

fn default_true() -> bool {
    true
}

fn default_allocation() -> BufferAllocation {
    BufferAllocation::Direct
}

fn default_max_frame_size() -> u32 {
    16 * 1024 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Default worker count: half the cores, but at least four.
pub fn default_workers() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cores / 2).max(4)
}

/// Socket options applied to every connection, on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketOptions {
    /// SO_RCVBUF, also the size of the per-connection receive scratch buffer.
    pub receive_buffer_size: usize,
    /// SO_SNDBUF, also the size of the per-connection send scratch buffer.
    pub send_buffer_size: usize,
    pub tcp_no_delay: bool,
}

impl Default for SocketOptions {
    fn default() -> Self {
        let section = SocketSection::default();
        Self {
            receive_buffer_size: section.receive_buffer_size,
            send_buffer_size: section.send_buffer_size,
            tcp_no_delay: section.tcp_no_delay,
        }
    }
}

/// Buffer management options, on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferOptions {
    pub allocation: BufferAllocation,
    pub pooling: bool,
    pub max_frame_size: u32,
}

impl Default for BufferOptions {
    fn default() -> Self {
        let section = BufferSection::default();
        Self {
            allocation: section.allocation,
            pooling: section.pooling,
            max_frame_size: section.max_frame_size,
        }
    }
}

/// Final resolved server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub workers: usize,
    pub protocol: Protocol,
    pub wait: WaitStrategy,
    pub socket: SocketOptions,
    pub buffers: BufferOptions,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::merge(CliArgs::default(), TomlConfig::default())
    }
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        let config = Self::merge(cli, toml_config);
        config.validate()?;
        Ok(config)
    }

    /// Merge CLI args over TOML values.
    pub fn merge(cli: CliArgs, toml_config: TomlConfig) -> Self {
        Config {
            listen: cli.listen.unwrap_or(toml_config.server.listen),
            workers: cli
                .workers
                .or(toml_config.server.workers)
                .unwrap_or_else(default_workers),
            protocol: cli.protocol.unwrap_or(toml_config.server.protocol),
            wait: cli.wait.unwrap_or(toml_config.server.wait),
            socket: SocketOptions {
                receive_buffer_size: cli
                    .receive_buffer_size
                    .unwrap_or(toml_config.socket.receive_buffer_size),
                send_buffer_size: cli
                    .send_buffer_size
                    .unwrap_or(toml_config.socket.send_buffer_size),
                tcp_no_delay: cli.tcp_no_delay.unwrap_or(toml_config.socket.tcp_no_delay),
            },
            buffers: BufferOptions {
                allocation: cli.allocation.unwrap_or(toml_config.buffers.allocation),
                pooling: cli.pooling.unwrap_or(toml_config.buffers.pooling),
                max_frame_size: cli
                    .max_frame_size
                    .unwrap_or(toml_config.buffers.max_frame_size),
            },
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        }
    }

    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1"));
        }
        if self.buffers.max_frame_size > i32::MAX as u32 {
            return Err(ConfigError::Invalid(
                "max_frame_size must fit in a signed 32-bit length",
            ));
        }
        Ok(())
    }
}

/// Client-side configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub address: String,
    pub socket: SocketOptions,
    pub buffers: BufferOptions,
}

impl ClientConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            socket: SocketOptions::default(),
            buffers: BufferOptions::default(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    FileRead(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    TomlParse(PathBuf, #[source] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.listen, "0.0.0.0:1111");
        assert!(config.workers >= 4);
        assert_eq!(config.protocol, Protocol::Structures);
        assert_eq!(config.wait, WaitStrategy::Block);
        assert_eq!(config.socket.receive_buffer_size, 256 * 1024);
        assert_eq!(config.socket.send_buffer_size, 256 * 1024);
        assert!(config.socket.tcp_no_delay);
        assert_eq!(config.buffers.allocation, BufferAllocation::Direct);
        assert!(config.buffers.pooling);
        assert_eq!(config.buffers.max_frame_size, 16 * 1024 * 1024);
        assert_eq!(config.log_level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            listen = "127.0.0.1:2222"
            workers = 2
            protocol = "echo"
            wait = "busy-poll"

            [socket]
            receive_buffer_size = 65536
            send_buffer_size = 32768
            tcp_no_delay = false

            [buffers]
            allocation = "heap"
            pooling = false
            max_frame_size = 1048576

            [logging]
            level = "debug"
        "#;

        let toml_config: TomlConfig = toml::from_str(toml_str).unwrap();
        let config = Config::merge(CliArgs::default(), toml_config);
        assert_eq!(config.listen, "127.0.0.1:2222");
        assert_eq!(config.workers, 2);
        assert_eq!(config.protocol, Protocol::Echo);
        assert_eq!(config.wait, WaitStrategy::BusyPoll);
        assert_eq!(config.socket.receive_buffer_size, 65536);
        assert_eq!(config.socket.send_buffer_size, 32768);
        assert!(!config.socket.tcp_no_delay);
        assert_eq!(config.buffers.allocation, BufferAllocation::Heap);
        assert!(!config.buffers.pooling);
        assert_eq!(config.buffers.max_frame_size, 1048576);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_cli_overrides_toml() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [server]
            workers = 2
            [buffers]
            pooling = false
        "#,
        )
        .unwrap();
        let cli = CliArgs::parse_from([
            "hazelfast",
            "--workers",
            "8",
            "--pooling",
            "true",
            "--wait",
            "busy-poll",
        ]);

        let config = Config::merge(cli, toml_config);
        assert_eq!(config.workers, 8);
        assert!(config.buffers.pooling);
        assert_eq!(config.wait, WaitStrategy::BusyPoll);
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.workers = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.buffers.max_frame_size = u32::MAX;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unknown_protocol_is_rejected() {
        let result: Result<TomlConfig, _> = toml::from_str(
            r#"
            [server]
            protocol = "memcached"
        "#,
        );
        assert!(result.is_err());
    }
}
