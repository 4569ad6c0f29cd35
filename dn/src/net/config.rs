//! Network session configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Which driver runs the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IoMode {
    /// Dedicated thread, one line read per step
    #[default]
    Blocking,
    /// Async task over a receive buffer
    Nonblocking,
}

impl fmt::Display for IoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoMode::Blocking => f.write_str("blocking"),
            IoMode::Nonblocking => f.write_str("nonblocking"),
        }
    }
}

impl FromStr for IoMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "blocking" => Ok(IoMode::Blocking),
            "nonblocking" | "non-blocking" => Ok(IoMode::Nonblocking),
            other => Err(format!("unknown io mode '{}'", other)),
        }
    }
}

/// Network session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// TCP port to listen on or connect to
    #[serde(default = "default_port")]
    pub port: u16,

    /// Peer address for the client role
    #[serde(default = "default_address")]
    pub address: String,

    #[serde(rename = "io-mode", default)]
    pub io_mode: IoMode,

    /// Longest line accepted from the peer
    #[serde(rename = "max-line-len", default = "default_max_line_len")]
    pub max_line_len: usize,

    /// Delay between two connection attempts of the client
    #[serde(rename = "connect-retry-ms", default = "default_connect_retry_ms")]
    pub connect_retry_ms: u64,

    /// Read timeout of the blocking driver; bounds how late it answers pings
    #[serde(rename = "poll-interval-ms", default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Events buffered between the session and the broker
    #[serde(rename = "event-buffer", default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_port() -> u16 {
    debug!("default_port: called");
    5000
}

fn default_address() -> String {
    debug!("default_address: called");
    "127.0.0.1".to_string()
}

fn default_max_line_len() -> usize {
    debug!("default_max_line_len: called");
    1024
}

fn default_connect_retry_ms() -> u64 {
    debug!("default_connect_retry_ms: called");
    1000
}

fn default_poll_interval_ms() -> u64 {
    debug!("default_poll_interval_ms: called");
    50
}

fn default_event_buffer() -> usize {
    debug!("default_event_buffer: called");
    64
}

impl Default for NetworkConfig {
    fn default() -> Self {
        debug!("NetworkConfig::default: called");
        Self {
            port: 5000,
            address: "127.0.0.1".to_string(),
            io_mode: IoMode::default(),
            max_line_len: 1024,
            connect_retry_ms: 1000,
            poll_interval_ms: 50,
            event_buffer: 64,
        }
    }
}

impl NetworkConfig {
    pub fn connect_retry(&self) -> Duration {
        Duration::from_millis(self.connect_retry_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// `address:port` of the peer
    pub fn peer(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NetworkConfig::default();
        assert_eq!(config.port, 5000);
        assert_eq!(config.io_mode, IoMode::Blocking);
        assert_eq!(config.max_line_len, 1024);
        assert_eq!(config.connect_retry(), Duration::from_secs(1));
        assert_eq!(config.peer(), "127.0.0.1:5000");
    }

    #[test]
    fn test_yaml_io_mode() {
        let yaml = "io-mode: nonblocking\nport: 6001\n";
        let config: NetworkConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.io_mode, IoMode::Nonblocking);
        assert_eq!(config.port, 6001);
        assert_eq!(config.address, "127.0.0.1");
    }

    #[test]
    fn test_io_mode_from_str() {
        assert_eq!("Blocking".parse::<IoMode>().unwrap(), IoMode::Blocking);
        assert_eq!("non-blocking".parse::<IoMode>().unwrap(), IoMode::Nonblocking);
        assert!("async".parse::<IoMode>().is_err());
    }
}
