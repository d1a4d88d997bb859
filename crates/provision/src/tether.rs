//! USB Tethering & SSH Server
//!
//! Brings up rndis tethering on the UE, addresses the tethering interface,
//! and starts the dropbear SSH server on it.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, info};
use ue_lab_device_bridge::{
    poll_until, props, AdbError, DeviceBridge, PollError, DEVICE_TMP_DIR, POLL_INTERVAL,
};

use crate::sequencer::{kill_dropbear, remount_writable, SequencerError};

/// Tethering network interface exposed by the device.
pub const TETHER_INTERFACE: &str = "rndis0";

#[derive(Debug, thiserror::Error)]
pub enum TetherError {
    #[error(transparent)]
    Adb(#[from] AdbError),
    #[error(transparent)]
    Poll(#[from] PollError),
    #[error(transparent)]
    Sequencer(#[from] SequencerError),
    #[error("no tethering fallback for Android {0}")]
    UnsupportedOsVersion(u32),
}

/// `service call connectivity` payload for devices whose `svc usb` control
/// predates the rndis function switch. Transaction codes shift across
/// releases; see IConnectivityManager.aidl for the numbering.
pub fn connectivity_parcel(major: u32, enable: bool) -> Result<String, TetherError> {
    let state = if enable { 1 } else { 0 };
    let parcel = match major {
        5 | 6 => format!("service call connectivity 30 i32 {state}"),
        7 | 8 => format!("service call connectivity 33 i32 {state}"),
        9 | 10 => format!("service call connectivity 33 i32 {state} s16 uelab"),
        other => return Err(TetherError::UnsupportedOsVersion(other)),
    };
    Ok(parcel)
}

/// Command line that starts the dropbear server on the UE.
///
/// The flags are load-bearing for the lab setup (root login, key-only
/// auth against the staged authorized_keys). Do not modify them.
pub fn dropbear_launch_command(port: u16) -> String {
    format!(
        "dropbearmulti dropbear -R -p {port} -T {DEVICE_TMP_DIR}/authorized_keys -U 0 -G 0 -N root -A"
    )
}

/// Tethering and SSH server control for one device.
pub struct TetherControl<'a> {
    bridge: &'a dyn DeviceBridge,
    settle: Duration,
    interface_timeout: Duration,
    process_exit_timeout: Duration,
    remount_timeout: Duration,
}

impl<'a> TetherControl<'a> {
    pub fn new(bridge: &'a dyn DeviceBridge) -> Self {
        Self {
            bridge,
            settle: Duration::from_secs(3),
            interface_timeout: Duration::from_secs(10),
            process_exit_timeout: Duration::from_secs(5),
            remount_timeout: Duration::from_secs(10),
        }
    }

    /// Delay after a tethering toggle while the usb gadget re-enumerates.
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_interface_timeout(mut self, timeout: Duration) -> Self {
        self.interface_timeout = timeout;
        self
    }

    pub fn with_step_timeouts(mut self, remount: Duration, process_exit: Duration) -> Self {
        self.remount_timeout = remount;
        self.process_exit_timeout = process_exit;
        self
    }

    /// Toggle USB tethering, preferring the svc control when the device
    /// exposes it.
    pub async fn set_usb_tethering(&self, serial: &str, enable: bool) -> Result<(), TetherError> {
        let svc = self.bridge.shell_root(serial, "svc usb").await?;
        let has_rndis_control = svc
            .stdout()
            .map(|out| out.contains("rndis"))
            .unwrap_or(false);

        if has_rndis_control {
            let command = if enable {
                "svc usb setFunctions rndis"
            } else {
                // clears every usb function except charging
                "svc usb setFunctions"
            };
            self.bridge.shell_root(serial, command).await?;
        } else {
            let major = props::android_major_version(self.bridge, serial).await?;
            debug!("no rndis control in svc, falling back for Android {major}");
            let parcel = connectivity_parcel(major, enable)?;
            self.bridge.shell_root(serial, &parcel).await?;
        }

        // nothing observable to poll here; the gadget needs a moment
        // either way
        tokio::time::sleep(self.settle).await;
        Ok(())
    }

    /// Wait for the tethering interface and assign the device-side
    /// address.
    pub async fn assign_tether_address(
        &self,
        serial: &str,
        address: &str,
    ) -> Result<(), TetherError> {
        let bridge = self.bridge;
        poll_until(
            "rndis interface",
            self.interface_timeout,
            POLL_INTERVAL,
            move || async move {
                let outcome = bridge.shell_root(serial, "ip link show").await?;
                Ok(outcome
                    .stdout()
                    .map(|out| out.contains(TETHER_INTERFACE))
                    .unwrap_or(false))
            },
        )
        .await?;

        self.bridge
            .shell_root(
                serial,
                &format!("ip address add {address}/24 dev {TETHER_INTERFACE}"),
            )
            .await?;
        Ok(())
    }

    /// Kill prior instances, remount, stage an optional public key, and
    /// start the dropbear server on `port`.
    pub async fn start_ssh_server(
        &self,
        serial: &str,
        port: u16,
        pubkey: Option<&Path>,
    ) -> Result<(), TetherError> {
        kill_dropbear(self.bridge, serial, self.process_exit_timeout).await?;
        remount_writable(self.bridge, serial, self.remount_timeout).await?;

        if let Some(pubkey) = pubkey {
            // /data/local/tmp is the key location convention: readable by
            // everyone, no permission surprises
            self.bridge.push(serial, pubkey, DEVICE_TMP_DIR).await?;
        }

        info!("starting dropbear on {serial} port {port}");
        self.bridge
            .shell_root(serial, &dropbear_launch_command(port))
            .await?;
        Ok(())
    }

    /// Full bring-up: cycle tethering, address the interface, start the
    /// SSH server.
    pub async fn bring_up(
        &self,
        serial: &str,
        port: u16,
        address: &str,
        pubkey: Option<&Path>,
    ) -> Result<(), TetherError> {
        self.set_usb_tethering(serial, false).await?;
        self.set_usb_tethering(serial, true).await?;
        self.assign_tether_address(serial, address).await?;
        self.start_ssh_server(serial, port, pubkey).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{writable_mounts, FakeBridge};
    use ue_lab_device_bridge::ShellOutcome;

    const SERIAL: &str = "ABC123";

    fn fast(control: TetherControl<'_>) -> TetherControl<'_> {
        control
            .with_settle(Duration::ZERO)
            .with_interface_timeout(Duration::from_millis(50))
            .with_step_timeouts(Duration::from_millis(50), Duration::from_millis(50))
    }

    #[test]
    fn test_fallback_table_rows() {
        assert_eq!(
            connectivity_parcel(5, true).unwrap(),
            "service call connectivity 30 i32 1"
        );
        assert_eq!(
            connectivity_parcel(7, true).unwrap(),
            "service call connectivity 33 i32 1"
        );
        assert_eq!(
            connectivity_parcel(8, false).unwrap(),
            "service call connectivity 33 i32 0"
        );
        assert_eq!(
            connectivity_parcel(10, true).unwrap(),
            "service call connectivity 33 i32 1 s16 uelab"
        );
    }

    #[test]
    fn test_fallback_table_rejects_unknown_majors() {
        assert!(matches!(
            connectivity_parcel(11, true),
            Err(TetherError::UnsupportedOsVersion(11))
        ));
        assert!(matches!(
            connectivity_parcel(4, true),
            Err(TetherError::UnsupportedOsVersion(4))
        ));
    }

    #[test]
    fn test_dropbear_flags_are_fixed() {
        let command = dropbear_launch_command(2222);
        assert_eq!(
            command,
            "dropbearmulti dropbear -R -p 2222 -T /data/local/tmp/authorized_keys -U 0 -G 0 -N root -A"
        );
        assert!(command.contains("-R -p 2222"));
        assert!(command.contains("-U 0 -G 0 -N root -A"));
    }

    #[tokio::test]
    async fn test_modern_tethering_control() {
        let bridge = FakeBridge::new();
        bridge.respond(
            "svc usb",
            ShellOutcome::Success("usage: svc usb setFunctions [rndis|mtp|ptp]".into()),
        );

        let control = fast(TetherControl::new(&bridge));
        control.set_usb_tethering(SERIAL, true).await.unwrap();
        control.set_usb_tethering(SERIAL, false).await.unwrap();

        let commands = bridge.shell_commands();
        assert!(commands.contains(&"svc usb setFunctions rndis".to_string()));
        assert!(commands.contains(&"svc usb setFunctions".to_string()));
    }

    #[tokio::test]
    async fn test_fallback_tethering_uses_major_version_row() {
        let bridge = FakeBridge::new();
        bridge.respond("svc usb", ShellOutcome::Success("usage: svc usb".into()));
        bridge.respond(
            "getprop ro.build.version.release",
            ShellOutcome::Success("7.1.2".into()),
        );

        let control = fast(TetherControl::new(&bridge));
        control.set_usb_tethering(SERIAL, true).await.unwrap();

        assert!(bridge
            .shell_commands()
            .contains(&"service call connectivity 33 i32 1".to_string()));
    }

    #[tokio::test]
    async fn test_fallback_tethering_unsupported_major() {
        let bridge = FakeBridge::new();
        bridge.respond("svc usb", ShellOutcome::Success("usage: svc usb".into()));
        bridge.respond(
            "getprop ro.build.version.release",
            ShellOutcome::Success("11".into()),
        );

        let control = fast(TetherControl::new(&bridge));
        let err = control.set_usb_tethering(SERIAL, true).await.unwrap_err();
        assert!(matches!(err, TetherError::UnsupportedOsVersion(11)));
    }

    #[tokio::test]
    async fn test_address_assignment_waits_for_interface() {
        let bridge = FakeBridge::new();
        bridge.respond("ip link show", ShellOutcome::Success("1: lo\n".into()));
        bridge.respond(
            "ip link show",
            ShellOutcome::Success("1: lo\n2: rndis0\n".into()),
        );

        let control = fast(TetherControl::new(&bridge));
        control
            .assign_tether_address(SERIAL, "192.168.42.22")
            .await
            .unwrap();

        assert!(bridge
            .shell_commands()
            .contains(&"ip address add 192.168.42.22/24 dev rndis0".to_string()));
    }

    #[tokio::test]
    async fn test_missing_interface_times_out() {
        let bridge = FakeBridge::new();
        bridge.respond("ip link show", ShellOutcome::Success("1: lo\n".into()));

        let control = fast(TetherControl::new(&bridge));
        let err = control
            .assign_tether_address(SERIAL, "192.168.42.22")
            .await
            .unwrap_err();
        assert!(matches!(err, TetherError::Poll(PollError::Timeout(_, _))));

        // the address must not be assigned to a missing interface
        assert!(!bridge
            .shell_commands()
            .iter()
            .any(|c| c.starts_with("ip address add")));
    }

    #[tokio::test]
    async fn test_ssh_server_launch_sequence() {
        let bridge = FakeBridge::new();
        bridge.respond("mount", writable_mounts());

        let control = fast(TetherControl::new(&bridge));
        control.start_ssh_server(SERIAL, 2222, None).await.unwrap();

        let commands = bridge.shell_commands();
        assert!(commands.contains(&"pkill -f dropbearmulti".to_string()));
        let launch = commands.last().unwrap();
        assert!(launch.contains("-R -p 2222"));
        assert!(launch.contains("-U 0 -G 0 -N root -A"));
    }
}
