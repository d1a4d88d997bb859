//! Lab Configuration
//!
//! Host-side settings for a provisioning session: where the payload blobs
//! live, how the tethering network is laid out, and how long to wait for
//! the device. Loaded from a toml file that is created with defaults on
//! first run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabConfig {
    /// Directory holding the bundled device payloads.
    pub payload_dir: PathBuf,
    /// Public key pushed to the device before the SSH server starts.
    pub pubkey_path: Option<PathBuf>,
    pub network: NetworkConfig,
    pub timeouts: TimeoutConfig,
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            payload_dir: PathBuf::from("payloads"),
            pubkey_path: None,
            network: NetworkConfig::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

/// Tethering network layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Host bridge aggregating the tethering interfaces.
    pub bridge_name: String,
    /// Address prefix of the tethering subnet; the device address is
    /// prefix + SSH port.
    pub subnet_prefix: String,
    /// Tethering subnet in CIDR form.
    pub subnet_cidr: String,
    /// Gateway address assigned to the bridge, in CIDR form.
    pub gateway_cidr: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bridge_name: "uelab0".to_string(),
            subnet_prefix: "192.168.42.".to_string(),
            subnet_cidr: "192.168.42.0/24".to_string(),
            gateway_cidr: "192.168.42.1/24".to_string(),
        }
    }
}

/// Deadlines for device-side waits, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for any single adb command.
    pub command_secs: u64,
    /// Wait for a remount to show up in the mount table.
    pub remount_secs: u64,
    /// Wait for a killed process to exit.
    pub process_exit_secs: u64,
    /// Wait for the tethering interface to appear.
    pub interface_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            command_secs: 60,
            remount_secs: 10,
            process_exit_secs: 5,
            interface_secs: 10,
        }
    }
}

impl LabConfig {
    /// Default location of the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ue-lab")
            .join("config.toml")
    }

    /// Load the configuration, creating a default file on first run.
    pub async fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("loading configuration from {:?}", path);
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {:?}", path))?;
            let config = toml::from_str(&content)
                .with_context(|| format!("parsing {:?}", path))?;
            Ok(config)
        } else {
            info!("creating default configuration at {:?}", path);
            let config = Self::default();
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let content = toml::to_string_pretty(&config)?;
            tokio::fs::write(path, content).await?;
            Ok(config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_round_trips_through_toml() {
        let config = LabConfig::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: LabConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let parsed: LabConfig = toml::from_str("payload_dir = \"/srv/ue-payloads\"\n").unwrap();
        assert_eq!(parsed.payload_dir, PathBuf::from("/srv/ue-payloads"));
        assert_eq!(parsed.network.bridge_name, "uelab0");
        assert_eq!(parsed.timeouts.command_secs, 60);
    }

    #[test]
    fn test_network_defaults_are_consistent() {
        let network = NetworkConfig::default();
        assert!(network.gateway_cidr.starts_with(&network.subnet_prefix));
        assert!(network.subnet_cidr.starts_with(&network.subnet_prefix));
    }
}
