use std::time::Duration;

use clap::Parser;
use tracing::Level;

/// Real-time text relay server
#[derive(Parser, Clone, Debug)]
#[command(name = "relay-server", version, about = "Real-time text relay server")]
pub struct Config {
    /// Address to bind
    #[arg(long, env = "RELAY_BIND_ADDRESS", default_value = "127.0.0.1")]
    pub bind_address: String,

    /// Port to listen on (0 picks an ephemeral port)
    #[arg(long, env = "RELAY_PORT", default_value_t = 12345)]
    pub port: u16,

    /// Time a new connection has to send `USERNAME:<name>`
    #[arg(long, env = "RELAY_HANDSHAKE_TIMEOUT_MS", default_value_t = 10_000)]
    pub handshake_timeout_ms: u64,

    /// Deadline for queueing and writing a message to one recipient
    #[arg(long, env = "RELAY_WRITE_TIMEOUT_MS", default_value_t = 5_000)]
    pub write_timeout_ms: u64,

    /// Disconnect clients that stay silent this long
    #[arg(long, env = "RELAY_IDLE_TIMEOUT_SECS")]
    pub idle_timeout_secs: Option<u64>,

    /// Outbound messages buffered per connection
    #[arg(long, env = "RELAY_QUEUE_LEN", default_value_t = 64)]
    pub queue_len: usize,

    /// Do not send join/leave notices
    #[arg(long, env = "RELAY_NO_ANNOUNCE")]
    pub no_announce: bool,

    /// Maximum log level (trace, debug, info, warn, error)
    #[arg(long, env = "RELAY_LOG_LEVEL", default_value = "info")]
    pub log_level: Level,
}

impl Config {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }

    pub fn announce(&self) -> bool {
        !self.no_announce
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_owned(),
            port: 12345,
            handshake_timeout_ms: 10_000,
            write_timeout_ms: 5_000,
            idle_timeout_secs: None,
            queue_len: 64,
            no_announce: false,
            log_level: Level::INFO,
        }
    }
}
