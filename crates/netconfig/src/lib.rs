//! Host Network Configuration
//!
//! Aggregates per-device tethering interfaces behind one addressed bridge
//! on the lab host and installs the NAT and port-forward rules that make
//! the UEs reachable from the lab network.

pub mod bridge;
pub mod firewall;
pub mod interfaces;
pub mod ports;
pub mod runner;

pub use bridge::{create_bridge, delete_bridge, BridgeConfig};
pub use firewall::ForwardingPlan;
pub use interfaces::{HostInterfaces, InterfaceError};
pub use ports::{PortPlan, PortPlanError};
pub use runner::{HostCmdError, HostRunner};
