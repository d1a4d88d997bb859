//! CLI commands
//!
//! REPL commands the operator drives a provisioning session with.

use std::time::Duration;

use anyhow::Result;
use tracing::info;

use ue_lab_device_bridge::{AdbClient, Device, DeviceBridge};
use ue_lab_netconfig::{
    create_bridge, delete_bridge, BridgeConfig, ForwardingPlan, HostInterfaces, HostRunner,
    PortPlan,
};
use ue_lab_provision::{PayloadStore, ProvisionReport, Sequencer, TetherControl};

use crate::config::LabConfig;

/// Parsed operator input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    List,
    Install { serial: String },
    Ssh { serial: String },
    Forward,
    RestartServer,
    Help,
    Exit,
}

impl ReplCommand {
    /// Parse an input line. Commands take at most one argument.
    pub fn parse(line: &str) -> Option<Self> {
        let mut tokens = line.split_whitespace();
        let command = tokens.next()?;
        let argument = tokens.next();
        if tokens.next().is_some() {
            return None;
        }

        match (command, argument) {
            ("list", None) => Some(ReplCommand::List),
            ("install", Some(serial)) => Some(ReplCommand::Install {
                serial: serial.to_string(),
            }),
            ("ssh", Some(serial)) => Some(ReplCommand::Ssh {
                serial: serial.to_string(),
            }),
            ("forward", None) => Some(ReplCommand::Forward),
            ("restart-server", None) => Some(ReplCommand::RestartServer),
            ("help", None) => Some(ReplCommand::Help),
            ("exit", None) | ("quit", None) => Some(ReplCommand::Exit),
            _ => None,
        }
    }
}

/// Device list command
pub struct ListCommand;

impl ListCommand {
    pub async fn execute(&self, adb: &AdbClient) -> Result<Vec<Device>> {
        let devices = adb.list_devices().await?;

        if devices.is_empty() {
            println!("No devices attached");
        } else {
            println!("Attached devices:");
            for device in &devices {
                println!("  {}\t{}", device.serial, device.state.as_str());
            }
        }

        Ok(devices)
    }
}

/// Install command options
pub struct InstallCommand {
    pub serial: String,
}

impl InstallCommand {
    /// Run the full provisioning sequence for one device.
    pub async fn execute(&self, adb: &AdbClient, config: &LabConfig) -> Result<()> {
        let payloads = PayloadStore::new(&config.payload_dir);
        let sequencer = Sequencer::new(adb, &payloads).with_timeouts(
            Duration::from_secs(config.timeouts.remount_secs),
            Duration::from_secs(config.timeouts.process_exit_secs),
        );

        println!("Provisioning {}. This may take a while...", self.serial);
        let report = sequencer.provision(&self.serial).await?;
        print_report(&report);
        Ok(())
    }
}

fn print_report(report: &ProvisionReport) {
    println!(
        "  dropbearmulti SSH: {}",
        if report.dropbear_installed {
            "ready"
        } else {
            "FAILED, please try again"
        }
    );
    match &report.iperf3_skipped_abi {
        Some(abilist) => println!("  iperf3.9: architecture {abilist} not supported"),
        None => println!(
            "  iperf3.9: {}",
            if report.iperf3_installed {
                "ready"
            } else {
                "FAILED, please try again"
            }
        ),
    }
    println!(
        "  diag logging: {}",
        if report.diag_prepared {
            "ready"
        } else {
            "not available"
        }
    );
}

/// SSH bring-up command options
pub struct SshCommand {
    pub serial: String,
    pub port: u16,
}

impl SshCommand {
    /// Cycle tethering, address the tethering interface, and start the
    /// dropbear server on the chosen port.
    pub async fn execute(&self, adb: &AdbClient, config: &LabConfig) -> Result<()> {
        let tether = TetherControl::new(adb)
            .with_interface_timeout(Duration::from_secs(config.timeouts.interface_secs))
            .with_step_timeouts(
                Duration::from_secs(config.timeouts.remount_secs),
                Duration::from_secs(config.timeouts.process_exit_secs),
            );

        let address = PortPlan::device_address(&config.network.subnet_prefix, self.port);
        println!(
            "Setting up the SSH server on {}. This may take a while...",
            self.serial
        );
        tether
            .bring_up(
                &self.serial,
                self.port,
                &address,
                config.pubkey_path.as_deref(),
            )
            .await?;

        // direct host access, independent of the bridge routing
        adb.forward(&self.serial, self.port, self.port).await?;

        println!("dropbear SSH server running on {}:{}", address, self.port);
        Ok(())
    }
}

/// Host forwarding command options
pub struct ForwardCommand {
    pub lab_interface: String,
    pub delete_stale_bridge: bool,
}

impl ForwardCommand {
    /// Bridge the tethering interfaces and install the NAT and
    /// port-forward rules for every collected SSH port.
    pub async fn execute(&self, config: &LabConfig, ports: &PortPlan) -> Result<()> {
        let runner = HostRunner::new()?;
        let host = HostInterfaces::discover()?;
        let lab_ip = host.lab_ipv4(&self.lab_interface)?;

        if self.delete_stale_bridge {
            // a missing stale bridge is fine
            if let Err(err) = delete_bridge(&runner, &config.network.bridge_name).await {
                info!("stale bridge removal: {err}");
            }
        }

        let members = host.tethering_interfaces(&config.network.subnet_prefix);
        if members.is_empty() {
            println!(
                "No interfaces with prefix {} found, check that tethering is up",
                config.network.subnet_prefix
            );
            return Ok(());
        }

        let bridge_config = BridgeConfig {
            name: config.network.bridge_name.clone(),
            gateway_cidr: config.network.gateway_cidr.clone(),
        };
        create_bridge(&runner, &bridge_config, &members).await?;

        let plan = ForwardingPlan {
            bridge: config.network.bridge_name.clone(),
            lab_interface: self.lab_interface.clone(),
            lab_ip,
            subnet_cidr: config.network.subnet_cidr.clone(),
            subnet_prefix: config.network.subnet_prefix.clone(),
        };
        plan.apply(&runner, ports).await?;

        println!(
            "Bridge {} up, forwarding {} port(s) through {}",
            config.network.bridge_name,
            ports.ports().len(),
            self.lab_interface
        );
        Ok(())
    }
}

/// adb server restart command
pub struct RestartServerCommand;

impl RestartServerCommand {
    pub async fn execute(&self, adb: &AdbClient) -> Result<()> {
        println!("Restarting the adb server in root mode...");
        adb.restart_server_rooted().await?;
        println!("adb server restarted; forwarding rules must be set up again");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_two_token_commands() {
        assert_eq!(
            ReplCommand::parse("install ABC123"),
            Some(ReplCommand::Install {
                serial: "ABC123".into()
            })
        );
        assert_eq!(
            ReplCommand::parse("ssh ABC123"),
            Some(ReplCommand::Ssh {
                serial: "ABC123".into()
            })
        );
    }

    #[test]
    fn test_parse_bare_commands() {
        assert_eq!(ReplCommand::parse("list"), Some(ReplCommand::List));
        assert_eq!(ReplCommand::parse("forward"), Some(ReplCommand::Forward));
        assert_eq!(
            ReplCommand::parse("restart-server"),
            Some(ReplCommand::RestartServer)
        );
        assert_eq!(ReplCommand::parse("exit"), Some(ReplCommand::Exit));
    }

    #[test]
    fn test_parse_rejects_malformed_input() {
        assert_eq!(ReplCommand::parse(""), None);
        assert_eq!(ReplCommand::parse("install"), None);
        assert_eq!(ReplCommand::parse("install A B"), None);
        assert_eq!(ReplCommand::parse("flash ABC123"), None);
    }

    #[test]
    fn test_parse_tolerates_extra_whitespace() {
        assert_eq!(
            ReplCommand::parse("  install   ABC123  "),
            Some(ReplCommand::Install {
                serial: "ABC123".into()
            })
        );
    }
}
