//! UE Lab Provisioner
//!
//! Interactive tool that prepares rooted Android devices as "user
//! equipment" in the radio test lab: it installs the dropbearmulti SSH
//! multiplexer and the iperf3 throughput tool over adb, brings up USB
//! tethering, and configures the host-side bridge, NAT, and port
//! forwarding that make the devices reachable from the lab network.
//!
//! The workspace is organized into specialized crates:
//!
//! - `ue-lab-device-bridge`: adb client, device probing, bounded polling
//! - `ue-lab-provision`: install sequencer, tethering and SSH bring-up
//! - `ue-lab-netconfig`: host bridge, NAT, and port-forward rules

pub mod commands;
pub mod config;

// Re-export crates
pub use ue_lab_device_bridge as device_bridge;
pub use ue_lab_netconfig as netconfig;
pub use ue_lab_provision as provision;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "UE Lab Provisioner";
