//! NAT & Port Forwarding Rules
//!
//! iptables rules that let the lab network reach each UE through the
//! host: masquerade behind the bridge, source-NAT on the lab interface,
//! and one DNAT plus FORWARD pair per allocated SSH port.

use std::net::Ipv4Addr;

use tracing::info;

use crate::ports::PortPlan;
use crate::runner::{argv, HostCmdError, HostRunner};

/// Everything the rule set needs to know about the session.
#[derive(Debug, Clone)]
pub struct ForwardingPlan {
    /// Bridge aggregating the tethering interfaces.
    pub bridge: String,
    /// Interface facing the lab network.
    pub lab_interface: String,
    /// Address of the lab interface, used as the SNAT source.
    pub lab_ip: Ipv4Addr,
    /// Tethering subnet in CIDR form, e.g. `192.168.42.0/24`.
    pub subnet_cidr: String,
    /// Tethering address prefix, e.g. `192.168.42.`.
    pub subnet_prefix: String,
}

pub fn masquerade_rule(bridge: &str) -> Vec<String> {
    argv(&[
        "iptables", "-t", "nat", "-A", "POSTROUTING", "-o", bridge, "-j", "MASQUERADE",
    ])
}

pub fn snat_rule(lab_interface: &str, lab_ip: Ipv4Addr, subnet_cidr: &str) -> Vec<String> {
    argv(&[
        "iptables",
        "-t",
        "nat",
        "-A",
        "POSTROUTING",
        "!",
        "-d",
        subnet_cidr,
        "-o",
        lab_interface,
        "-j",
        "SNAT",
        "--to-source",
        &lab_ip.to_string(),
    ])
}

pub fn dnat_rule(lab_interface: &str, port: u16, device_address: &str) -> Vec<String> {
    argv(&[
        "iptables",
        "-A",
        "PREROUTING",
        "-t",
        "nat",
        "-i",
        lab_interface,
        "-p",
        "tcp",
        "--dport",
        &port.to_string(),
        "-j",
        "DNAT",
        "--to",
        &format!("{device_address}:{port}"),
    ])
}

pub fn forward_accept_rule(port: u16, device_address: &str) -> Vec<String> {
    argv(&[
        "iptables",
        "-A",
        "FORWARD",
        "-p",
        "tcp",
        "-d",
        device_address,
        "--dport",
        &port.to_string(),
        "-j",
        "ACCEPT",
    ])
}

pub fn enable_ip_forward() -> Vec<String> {
    argv(&["sh", "-c", "echo 1 > /proc/sys/net/ipv4/ip_forward"])
}

impl ForwardingPlan {
    /// Install the session's NAT and forwarding rules.
    pub async fn apply(&self, runner: &HostRunner, ports: &PortPlan) -> Result<(), HostCmdError> {
        info!(
            "installing NAT rules: bridge {} via {}",
            self.bridge, self.lab_interface
        );
        runner.run(&masquerade_rule(&self.bridge)).await?;
        runner
            .run(&snat_rule(&self.lab_interface, self.lab_ip, &self.subnet_cidr))
            .await?;
        runner.run(&enable_ip_forward()).await?;

        for &port in ports.ports() {
            let device_address = PortPlan::device_address(&self.subnet_prefix, port);
            runner
                .run(&dnat_rule(&self.lab_interface, port, &device_address))
                .await?;
            runner
                .run(&forward_accept_rule(port, &device_address))
                .await?;
            info!("forwarding lab port {port} to {device_address}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masquerade_rule() {
        assert_eq!(
            masquerade_rule("uelab0"),
            vec![
                "iptables", "-t", "nat", "-A", "POSTROUTING", "-o", "uelab0", "-j", "MASQUERADE"
            ]
        );
    }

    #[test]
    fn test_snat_rule_excludes_tethering_subnet() {
        let rule = snat_rule("eno1", Ipv4Addr::new(10, 12, 1, 40), "192.168.42.0/24");
        assert_eq!(
            rule,
            vec![
                "iptables",
                "-t",
                "nat",
                "-A",
                "POSTROUTING",
                "!",
                "-d",
                "192.168.42.0/24",
                "-o",
                "eno1",
                "-j",
                "SNAT",
                "--to-source",
                "10.12.1.40"
            ]
        );
    }

    #[test]
    fn test_dnat_rule_targets_port_derived_address() {
        let rule = dnat_rule("eno1", 22, "192.168.42.22");
        assert!(rule.contains(&"--dport".to_string()));
        assert!(rule.contains(&"22".to_string()));
        assert!(rule.contains(&"192.168.42.22:22".to_string()));
    }

    #[test]
    fn test_forward_accept_rule() {
        assert_eq!(
            forward_accept_rule(22, "192.168.42.22"),
            vec![
                "iptables",
                "-A",
                "FORWARD",
                "-p",
                "tcp",
                "-d",
                "192.168.42.22",
                "--dport",
                "22",
                "-j",
                "ACCEPT"
            ]
        );
    }
}
