//! dronenet configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::broker::BrokerConfig;
use crate::net::NetworkConfig;
use crate::supervisor::SupervisorConfig;

/// Main dronenet configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Heartbeat timing and shutdown
    pub supervisor: SupervisorConfig,

    /// World defaults and routing buffers
    pub broker: BrokerConfig,

    /// Peer connection
    pub network: NetworkConfig,

    /// PID rendezvous file
    pub registry: RegistryConfig,
}

/// Project-local config file, looked up in the working directory
const LOCAL_FILE: &str = ".dronenet.yml";

impl Config {
    /// Read the configuration for this run
    ///
    /// An explicit path must load. Otherwise the first readable file from
    /// [`Config::search_paths`] wins; unreadable ones are skipped with a
    /// warning, and with none left the defaults apply.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        debug!(?config_path, "Config::load: called");
        match config_path {
            Some(path) => Self::read(path).context(format!("Failed to load config from {}", path.display())),
            None => Ok(Self::first_readable(&Self::search_paths(dirs::config_dir()))),
        }
    }

    /// Implicit config locations, most specific first
    pub fn search_paths(config_dir: Option<PathBuf>) -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_FILE)];
        paths.extend(config_dir.map(|dir| dir.join("dronenet").join("dronenet.yml")));
        paths
    }

    fn first_readable(candidates: &[PathBuf]) -> Self {
        for path in candidates.iter().filter(|p| p.exists()) {
            match Self::read(path) {
                Ok(config) => return config,
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable config"),
            }
        }
        info!("No config file found, using defaults");
        Self::default()
    }

    fn read(path: &Path) -> Result<Self> {
        let yaml = fs::read_to_string(path).context("Failed to read config file")?;
        let config = serde_yaml::from_str(&yaml).context("Failed to parse config file")?;
        info!(path = %path.display(), "Loaded config");
        Ok(config)
    }
}

/// PID rendezvous registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Registry file; defaults to a file under the system temp dir
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Truncate the registry when a run starts
    #[serde(rename = "reset-on-start", default = "default_reset_on_start")]
    pub reset_on_start: bool,
}

fn default_reset_on_start() -> bool {
    debug!("default_reset_on_start: called");
    true
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: None,
            reset_on_start: true,
        }
    }
}

impl RegistryConfig {
    pub fn path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(pidregistry::default_registry_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::IoMode;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.supervisor.ping_timeout_ms, 2000);
        assert_eq!(config.broker.obstacle_period_ms, 5000);
        assert_eq!(config.network.port, 5000);
        assert!(config.registry.reset_on_start);
        assert_eq!(config.registry.path(), pidregistry::default_registry_path());
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "supervisor:\n  ping-timeout-ms: 250\nnetwork:\n  io-mode: nonblocking\n  port: 7001\nregistry:\n  path: /tmp/dn-test-pids.txt"
        )
        .unwrap();

        let config = Config::load(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(config.supervisor.ping_timeout_ms, 250);
        assert_eq!(config.supervisor.cycle_delay_ms, 500);
        assert_eq!(config.network.io_mode, IoMode::Nonblocking);
        assert_eq!(config.network.port, 7001);
        assert_eq!(config.broker.window_width, 100);
        assert_eq!(config.registry.path(), PathBuf::from("/tmp/dn-test-pids.txt"));
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let missing = PathBuf::from("/nonexistent/dronenet.yml");
        assert!(Config::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_load_invalid_yaml_fails() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "network: [not, a, map]").unwrap();
        assert!(Config::load(Some(&file.path().to_path_buf())).is_err());
    }

    #[test]
    fn test_search_paths_order() {
        let paths = Config::search_paths(Some(PathBuf::from("/home/u/.config")));
        assert_eq!(
            paths,
            vec![
                PathBuf::from(".dronenet.yml"),
                PathBuf::from("/home/u/.config/dronenet/dronenet.yml")
            ]
        );
        assert_eq!(Config::search_paths(None), vec![PathBuf::from(".dronenet.yml")]);
    }

    #[test]
    fn test_broken_candidate_falls_through() {
        let dir = tempfile::TempDir::new().unwrap();
        let broken = dir.path().join("broken.yml");
        let good = dir.path().join("good.yml");
        std::fs::write(&broken, "supervisor: [1, 2]").unwrap();
        std::fs::write(&good, "network:\n  port: 6100").unwrap();

        let missing = dir.path().join("missing.yml");
        let config = Config::first_readable(&[missing.clone(), broken.clone(), good]);
        assert_eq!(config.network.port, 6100);

        let config = Config::first_readable(&[missing, broken]);
        assert_eq!(config.network.port, 5000);
    }
}
