//! Host Interface Discovery
//!
//! Finds the lab-facing interface and the per-device tethering interfaces
//! by their assigned IPv4 addresses.

use std::net::Ipv4Addr;

use network_interface::{Addr, NetworkInterface, NetworkInterfaceConfig};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("interface {0} not found")]
    NotFound(String),
    #[error("interface {0} has no IPv4 address assigned")]
    NoAddress(String),
    #[error("interface enumeration failed: {0}")]
    Enumeration(String),
}

/// Snapshot of the host's interfaces and their IPv4 addresses.
#[derive(Debug, Clone)]
pub struct HostInterfaces {
    names: Vec<String>,
    entries: Vec<(String, Ipv4Addr)>,
}

impl HostInterfaces {
    /// Enumerate the host's current interfaces.
    pub fn discover() -> Result<Self, InterfaceError> {
        let interfaces = NetworkInterface::show()
            .map_err(|err| InterfaceError::Enumeration(err.to_string()))?;

        let mut names = Vec::new();
        let mut entries = Vec::new();
        for interface in interfaces {
            if !names.contains(&interface.name) {
                names.push(interface.name.clone());
            }
            for addr in &interface.addr {
                if let Addr::V4(v4) = addr {
                    entries.push((interface.name.clone(), v4.ip));
                }
            }
        }
        Ok(Self { names, entries })
    }

    /// Snapshot from known data, for tests.
    pub fn from_entries(names: Vec<String>, entries: Vec<(String, Ipv4Addr)>) -> Self {
        Self { names, entries }
    }

    /// IPv4 address of the lab-facing interface.
    pub fn lab_ipv4(&self, name: &str) -> Result<Ipv4Addr, InterfaceError> {
        if let Some((_, ip)) = self.entries.iter().find(|(entry, _)| entry == name) {
            return Ok(*ip);
        }
        if self.names.iter().any(|entry| entry == name) {
            Err(InterfaceError::NoAddress(name.to_string()))
        } else {
            Err(InterfaceError::NotFound(name.to_string()))
        }
    }

    /// Names of interfaces holding an address inside the UE tethering
    /// subnet. These become the bridge members.
    pub fn tethering_interfaces(&self, prefix: &str) -> Vec<String> {
        let mut members = Vec::new();
        for (name, ip) in &self.entries {
            if ip.to_string().starts_with(prefix) && !members.contains(name) {
                members.push(name.clone());
            }
        }
        members
    }
}
