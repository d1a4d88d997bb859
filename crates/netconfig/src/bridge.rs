//! Host Bridge Setup
//!
//! One named bridge aggregates the per-device tethering interfaces and
//! carries the gateway address the UEs route through.

use tracing::info;

use crate::runner::{argv, HostCmdError, HostRunner};

/// Bridge identity on the lab host.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Bridge device name.
    pub name: String,
    /// Gateway address in CIDR form, e.g. `192.168.42.1/24`.
    pub gateway_cidr: String,
}

pub fn link_add(bridge: &str) -> Vec<String> {
    argv(&["ip", "link", "add", "name", bridge, "type", "bridge"])
}

pub fn link_set_master(interface: &str, bridge: &str) -> Vec<String> {
    argv(&["ip", "link", "set", interface, "master", bridge])
}

pub fn addr_add(cidr: &str, device: &str) -> Vec<String> {
    argv(&["ip", "address", "add", cidr, "dev", device])
}

pub fn link_up(device: &str) -> Vec<String> {
    argv(&["ip", "link", "set", device, "up"])
}

pub fn link_del(device: &str) -> Vec<String> {
    argv(&["ip", "link", "del", device])
}

/// Create the bridge, enslave the tethering interfaces, address it, and
/// bring it up.
pub async fn create_bridge(
    runner: &HostRunner,
    config: &BridgeConfig,
    members: &[String],
) -> Result<(), HostCmdError> {
    info!(
        "creating bridge {} with members {:?}",
        config.name, members
    );
    runner.run(&link_add(&config.name)).await?;
    for member in members {
        runner.run(&link_set_master(member, &config.name)).await?;
    }
    runner.run(&addr_add(&config.gateway_cidr, &config.name)).await?;
    runner.run(&link_up(&config.name)).await?;
    Ok(())
}

/// Tear down a previously created bridge.
pub async fn delete_bridge(runner: &HostRunner, name: &str) -> Result<(), HostCmdError> {
    info!("deleting bridge {name}");
    runner.run(&link_del(name)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_argv_shapes() {
        assert_eq!(
            link_add("uelab0"),
            vec!["ip", "link", "add", "name", "uelab0", "type", "bridge"]
        );
        assert_eq!(
            link_set_master("enx0a1b", "uelab0"),
            vec!["ip", "link", "set", "enx0a1b", "master", "uelab0"]
        );
        assert_eq!(
            addr_add("192.168.42.1/24", "uelab0"),
            vec!["ip", "address", "add", "192.168.42.1/24", "dev", "uelab0"]
        );
        assert_eq!(link_up("uelab0"), vec!["ip", "link", "set", "uelab0", "up"]);
        assert_eq!(link_del("uelab0"), vec!["ip", "link", "del", "uelab0"]);
    }
}
