//! Supervisor configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Supervisor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// How long a worker has to answer a ping
    #[serde(rename = "ping-timeout-ms", default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,

    /// Granularity of the wait for a pong
    #[serde(rename = "poll-step-ms", default = "default_poll_step_ms")]
    pub poll_step_ms: u64,

    /// Sleep between two full polling cycles
    #[serde(rename = "cycle-delay-ms", default = "default_cycle_delay_ms")]
    pub cycle_delay_ms: u64,

    /// Time between the graceful stop request and the forced kill
    #[serde(rename = "grace-period-ms", default = "default_grace_period_ms")]
    pub grace_period_ms: u64,

    /// Channel buffer size for control requests and pongs
    #[serde(rename = "channel-buffer", default = "default_channel_buffer")]
    pub channel_buffer: usize,
}

fn default_ping_timeout_ms() -> u64 {
    debug!("default_ping_timeout_ms: called");
    2000
}

fn default_poll_step_ms() -> u64 {
    debug!("default_poll_step_ms: called");
    10
}

fn default_cycle_delay_ms() -> u64 {
    debug!("default_cycle_delay_ms: called");
    500
}

fn default_grace_period_ms() -> u64 {
    debug!("default_grace_period_ms: called");
    500
}

fn default_channel_buffer() -> usize {
    debug!("default_channel_buffer: called");
    64
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        debug!("SupervisorConfig::default: called");
        Self {
            ping_timeout_ms: 2000,
            poll_step_ms: 10,
            cycle_delay_ms: 500,
            grace_period_ms: 500,
            channel_buffer: 64,
        }
    }
}

impl SupervisorConfig {
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn poll_step(&self) -> Duration {
        Duration::from_millis(self.poll_step_ms.max(1))
    }

    pub fn cycle_delay(&self) -> Duration {
        Duration::from_millis(self.cycle_delay_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}
