//! Device Bridge
//!
//! adb client for rooted UE devices: enumeration, property probes,
//! elevated shell execution, and file transfer. All device access used by
//! the provisioning code goes through the [`DeviceBridge`] trait so tests
//! can substitute a fake.

pub mod adb;
pub mod device;
pub mod outcome;
pub mod poll;
pub mod props;

pub use adb::{AdbClient, AdbError, DeviceBridge};
pub use device::{parse_device_list, Device, DeviceState};
pub use outcome::ShellOutcome;
pub use poll::{poll_until, PollError, POLL_INTERVAL};

/// World-writable staging directory on the device.
pub const DEVICE_TMP_DIR: &str = "/data/local/tmp";

/// Install target for provisioned binaries.
pub const SYSTEM_BIN_DIR: &str = "/system/bin";
