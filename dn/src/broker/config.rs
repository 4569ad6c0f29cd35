//! Broker configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::message::WindowSize;

/// Broker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Interval between two obstacle relocations
    #[serde(rename = "obstacle-period-ms", default = "default_obstacle_period_ms")]
    pub obstacle_period_ms: u64,

    /// How often the relocation timer is checked
    #[serde(rename = "tick-ms", default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Initial window width in cells (replaced by SIZE messages)
    #[serde(rename = "window-width", default = "default_window_width")]
    pub window_width: i32,

    /// Initial window height in cells (replaced by SIZE messages)
    #[serde(rename = "window-height", default = "default_window_height")]
    pub window_height: i32,

    /// Frames buffered per worker channel and direction
    #[serde(rename = "worker-channel-buffer", default = "default_worker_channel_buffer")]
    pub worker_channel_buffer: usize,

    /// Fixed RNG seed for reproducible relocations
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_obstacle_period_ms() -> u64 {
    debug!("default_obstacle_period_ms: called");
    5000
}

fn default_tick_ms() -> u64 {
    debug!("default_tick_ms: called");
    100
}

fn default_window_width() -> i32 {
    debug!("default_window_width: called");
    100
}

fn default_window_height() -> i32 {
    debug!("default_window_height: called");
    100
}

fn default_worker_channel_buffer() -> usize {
    debug!("default_worker_channel_buffer: called");
    64
}

impl Default for BrokerConfig {
    fn default() -> Self {
        debug!("BrokerConfig::default: called");
        Self {
            obstacle_period_ms: 5000,
            tick_ms: 100,
            window_width: 100,
            window_height: 100,
            worker_channel_buffer: 64,
            seed: None,
        }
    }
}

impl BrokerConfig {
    pub fn obstacle_period(&self) -> Duration {
        Duration::from_millis(self.obstacle_period_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn window(&self) -> WindowSize {
        WindowSize::new(self.window_width, self.window_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BrokerConfig::default();
        assert_eq!(config.obstacle_period(), Duration::from_secs(5));
        assert_eq!(config.window(), WindowSize::new(100, 100));
        assert!(config.seed.is_none());
    }

    #[test]
    fn test_yaml_overrides() {
        let yaml = "window-width: 120\nwindow-height: 40\nseed: 7\n";
        let config: BrokerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.window(), WindowSize::new(120, 40));
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.tick_ms, 100);
    }
}
