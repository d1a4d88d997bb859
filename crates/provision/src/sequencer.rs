//! Provisioning Sequencer
//!
//! Ordered install steps for a single device. A failed step is reported
//! and later steps still run, so the operator sees the full picture for
//! the device before deciding to retry.

use std::time::Duration;

use tracing::{debug, info, warn};
use ue_lab_device_bridge::{
    poll_until, props, AdbError, DeviceBridge, PollError, ShellOutcome, DEVICE_TMP_DIR,
    POLL_INTERVAL, SYSTEM_BIN_DIR,
};

use crate::diag;
use crate::payloads::{DeviceAbi, PayloadError, PayloadStore, DROPBEAR_BIN, IPERF3_BIN};

#[derive(Debug, thiserror::Error)]
pub enum SequencerError {
    #[error(transparent)]
    Adb(#[from] AdbError),
    #[error(transparent)]
    Poll(#[from] PollError),
    #[error(transparent)]
    Payload(#[from] PayloadError),
    #[error("{tool} did not respond after install")]
    VerifyFailed { tool: &'static str },
    #[error("no supported ABI in {0:?}")]
    UnsupportedAbi(String),
}

/// Summary of one provisioning run, shown to the operator.
#[derive(Debug, Default)]
pub struct ProvisionReport {
    pub dropbear_installed: bool,
    pub iperf3_installed: bool,
    /// ABI list of a device the throughput tool does not support.
    pub iperf3_skipped_abi: Option<String>,
    pub diag_prepared: bool,
}

/// Remount `/` and `/system` read-write and wait until the rw flag shows
/// up in the device's mount table.
pub async fn remount_writable(
    bridge: &dyn DeviceBridge,
    serial: &str,
    timeout: Duration,
) -> Result<(), SequencerError> {
    for target in ["/", "/system"] {
        bridge
            .shell_root(serial, &format!("mount -o rw,remount {target}"))
            .await?;
        poll_until("writable remount", timeout, POLL_INTERVAL, move || {
            async move {
                let outcome = bridge.shell_root(serial, "mount").await?;
                Ok(mount_is_writable(
                    outcome.stdout().unwrap_or_default(),
                    target,
                ))
            }
        })
        .await?;
    }
    Ok(())
}

/// Kill running SSH multiplexer instances and wait for them to exit.
pub async fn kill_dropbear(
    bridge: &dyn DeviceBridge,
    serial: &str,
    timeout: Duration,
) -> Result<(), SequencerError> {
    bridge
        .shell_root(serial, &format!("pkill -f {DROPBEAR_BIN}"))
        .await?;
    poll_until("dropbearmulti exit", timeout, POLL_INTERVAL, move || {
        async move {
            let outcome = bridge
                .shell_root(serial, &format!("pidof {DROPBEAR_BIN}"))
                .await?;
            Ok(outcome
                .stdout()
                .map(|out| out.trim().is_empty())
                .unwrap_or(true))
        }
    })
    .await?;
    Ok(())
}

/// True if the mount table shows `target` mounted read-write.
fn mount_is_writable(mount_output: &str, target: &str) -> bool {
    mount_output.lines().any(|line| {
        let words: Vec<&str> = line.split_whitespace().collect();
        // toolbox prints "<dev> on <point> type ... (rw,...)", toybox
        // prints "<dev> <point> <type> rw,..."
        let mounted = words.get(2) == Some(&target) || words.get(1) == Some(&target);
        mounted && (line.contains("(rw") || line.contains(" rw,"))
    })
}

/// Drives the install sequence against an injected bridge.
pub struct Sequencer<'a> {
    bridge: &'a dyn DeviceBridge,
    payloads: &'a PayloadStore,
    remount_timeout: Duration,
    process_exit_timeout: Duration,
}

impl<'a> Sequencer<'a> {
    pub fn new(bridge: &'a dyn DeviceBridge, payloads: &'a PayloadStore) -> Self {
        Self {
            bridge,
            payloads,
            remount_timeout: Duration::from_secs(10),
            process_exit_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeouts(mut self, remount: Duration, process_exit: Duration) -> Self {
        self.remount_timeout = remount;
        self.process_exit_timeout = process_exit;
        self
    }

    /// Run the full install sequence. Individual tool failures are
    /// reported in the returned summary; only bridge-level errors abort.
    pub async fn provision(&self, serial: &str) -> Result<ProvisionReport, SequencerError> {
        let mut report = ProvisionReport::default();

        remount_writable(self.bridge, serial, self.remount_timeout).await?;

        match self.install_dropbear(serial).await {
            Ok(()) => report.dropbear_installed = true,
            Err(err) => warn!("dropbearmulti install failed: {err}"),
        }

        match self.install_iperf3(serial).await {
            Ok(()) => report.iperf3_installed = true,
            Err(SequencerError::UnsupportedAbi(abilist)) => {
                warn!("architecture {abilist:?} not supported by {IPERF3_BIN}");
                report.iperf3_skipped_abi = Some(abilist);
            }
            Err(err) => warn!("{IPERF3_BIN} install failed: {err}"),
        }

        if props::has_qualcomm_modem(self.bridge, serial).await? {
            diag::prepare_diag_logging(self.bridge, self.payloads, serial).await?;
            report.diag_prepared = true;
        } else {
            info!("no Qualcomm baseband on {serial}, skipping diag setup");
        }

        Ok(report)
    }

    /// Whether the SSH multiplexer answers on the device.
    pub async fn check_dropbear(&self, serial: &str) -> Result<bool, SequencerError> {
        let outcome = self
            .bridge
            .shell_root(serial, &format!("{DROPBEAR_BIN} dropbear -V"))
            .await?;
        Ok(!matches!(outcome, ShellOutcome::NotFound))
    }

    /// Whether the throughput tool answers on the device.
    pub async fn check_iperf3(&self, serial: &str) -> Result<bool, SequencerError> {
        let outcome = self
            .bridge
            .shell_root(serial, &format!("{IPERF3_BIN} -v"))
            .await?;
        Ok(!matches!(outcome, ShellOutcome::NotFound))
    }

    /// Replace any running SSH multiplexer and install the binary into the
    /// system path, together with the staged host key and authorized_keys.
    pub async fn install_dropbear(&self, serial: &str) -> Result<(), SequencerError> {
        if self.check_dropbear(serial).await? {
            info!("{DROPBEAR_BIN} already present on {serial}");
            return Ok(());
        }

        kill_dropbear(self.bridge, serial, self.process_exit_timeout).await?;

        let binary = self.payloads.dropbearmulti()?;
        info!("installing {DROPBEAR_BIN} on {serial}");
        self.bridge.push(serial, &binary, DEVICE_TMP_DIR).await?;
        if let Some(key) = self.payloads.host_key() {
            self.bridge.push(serial, &key, DEVICE_TMP_DIR).await?;
        }
        if let Some(keys) = self.payloads.authorized_keys() {
            self.bridge.push(serial, &keys, DEVICE_TMP_DIR).await?;
        }

        self.bridge
            .shell_root(
                serial,
                &format!("mv {DEVICE_TMP_DIR}/{DROPBEAR_BIN} {SYSTEM_BIN_DIR}"),
            )
            .await?;
        self.bridge
            .shell_root(serial, &format!("chmod +x {SYSTEM_BIN_DIR}/{DROPBEAR_BIN}"))
            .await?;

        if !self.check_dropbear(serial).await? {
            return Err(SequencerError::VerifyFailed { tool: DROPBEAR_BIN });
        }
        Ok(())
    }

    /// Install the ABI-matched throughput tool binary.
    pub async fn install_iperf3(&self, serial: &str) -> Result<(), SequencerError> {
        let abilist = props::abi_list(self.bridge, serial).await?;
        debug!("device ABI list: {abilist}");
        let Some(abi) = DeviceAbi::from_abi_list(&abilist) else {
            return Err(SequencerError::UnsupportedAbi(abilist));
        };

        // iperf3 expects a world-writable /tmp, which rooted builds lack
        self.bridge.shell_root(serial, "mkdir /tmp").await?;
        self.bridge.shell_root(serial, "chmod 777 /tmp").await?;

        if self.check_iperf3(serial).await? {
            info!("{IPERF3_BIN} already present on {serial}");
            return Ok(());
        }

        let binary = self.payloads.iperf3(abi)?;
        info!("installing {IPERF3_BIN} ({}) on {serial}", abi.as_str());
        self.bridge.push(serial, &binary, DEVICE_TMP_DIR).await?;
        self.bridge
            .shell_root(
                serial,
                &format!("cp {DEVICE_TMP_DIR}/{IPERF3_BIN} {SYSTEM_BIN_DIR}"),
            )
            .await?;
        self.bridge
            .shell_root(serial, &format!("chmod +x {SYSTEM_BIN_DIR}/{IPERF3_BIN}"))
            .await?;

        if !self.check_iperf3(serial).await? {
            return Err(SequencerError::VerifyFailed { tool: IPERF3_BIN });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{payload_fixture, writable_mounts, FakeBridge};

    const SERIAL: &str = "ABC123";

    fn fast(seq: Sequencer<'_>) -> Sequencer<'_> {
        seq.with_timeouts(Duration::from_millis(50), Duration::from_millis(50))
    }

    #[test]
    fn test_mount_table_parsing() {
        let toolbox = "/dev/block/dm-0 on / type ext4 (rw,seclabel,relatime)\n";
        assert!(mount_is_writable(toolbox, "/"));
        assert!(!mount_is_writable(toolbox, "/system"));

        let readonly = "/dev/block/dm-0 on / type ext4 (ro,seclabel,relatime)\n";
        assert!(!mount_is_writable(readonly, "/"));

        let toybox = "/dev/block/sda22 /system ext4 rw,seclabel,relatime 0 0\n";
        assert!(mount_is_writable(toybox, "/system"));
    }

    #[tokio::test]
    async fn test_arm64_device_gets_the_64bit_binary() {
        let bridge = FakeBridge::new();
        bridge.respond(
            "getprop ro.product.cpu.abilist",
            ShellOutcome::Success("arm64-v8a,armeabi-v7a,armeabi".into()),
        );
        bridge.respond("iperf3.9 -v", ShellOutcome::NotFound);
        bridge.respond(
            "iperf3.9 -v",
            ShellOutcome::Success("iperf 3.9 (cJSON 1.7.13)".into()),
        );

        let (_dir, payloads) = payload_fixture();
        let sequencer = fast(Sequencer::new(&bridge, &payloads));
        sequencer.install_iperf3(SERIAL).await.unwrap();

        let pushed = bridge.pushed_paths();
        assert_eq!(pushed.len(), 1);
        assert!(pushed[0].to_string_lossy().contains("arm64-v8a"));
        assert!(!pushed[0].to_string_lossy().contains("armeabi-v7a"));
    }

    #[tokio::test]
    async fn test_unsupported_abi_issues_no_transfers() {
        let bridge = FakeBridge::new();
        bridge.respond(
            "getprop ro.product.cpu.abilist",
            ShellOutcome::Success("x86_64,x86".into()),
        );

        let (_dir, payloads) = payload_fixture();
        let sequencer = fast(Sequencer::new(&bridge, &payloads));
        let err = sequencer.install_iperf3(SERIAL).await.unwrap_err();

        assert!(matches!(err, SequencerError::UnsupportedAbi(ref list) if list == "x86_64,x86"));
        assert!(bridge.pushed_paths().is_empty());
    }

    #[tokio::test]
    async fn test_dropbear_install_moves_binary_into_system_path() {
        let bridge = FakeBridge::new();
        bridge.respond("dropbearmulti dropbear -V", ShellOutcome::NotFound);
        bridge.respond(
            "dropbearmulti dropbear -V",
            ShellOutcome::Success("Dropbear v2020.81".into()),
        );

        let (_dir, payloads) = payload_fixture();
        let sequencer = fast(Sequencer::new(&bridge, &payloads));
        sequencer.install_dropbear(SERIAL).await.unwrap();

        let commands = bridge.shell_commands();
        assert!(commands.contains(&"pkill -f dropbearmulti".to_string()));
        assert!(commands.contains(&"mv /data/local/tmp/dropbearmulti /system/bin".to_string()));
        assert!(commands.contains(&"chmod +x /system/bin/dropbearmulti".to_string()));

        // binary plus host key plus authorized_keys
        assert_eq!(bridge.pushes().len(), 3);
        for (_, remote) in bridge.pushes() {
            assert_eq!(remote, "/data/local/tmp");
        }
    }

    #[tokio::test]
    async fn test_dropbear_already_present_skips_install() {
        let bridge = FakeBridge::new();
        bridge.respond(
            "dropbearmulti dropbear -V",
            ShellOutcome::Success("Dropbear v2020.81".into()),
        );

        let (_dir, payloads) = payload_fixture();
        let sequencer = fast(Sequencer::new(&bridge, &payloads));
        sequencer.install_dropbear(SERIAL).await.unwrap();

        assert!(bridge.pushed_paths().is_empty());
    }

    #[tokio::test]
    async fn test_failed_verify_is_reported() {
        let bridge = FakeBridge::new();
        // stays missing even after the install commands ran
        bridge.respond("dropbearmulti dropbear -V", ShellOutcome::NotFound);

        let (_dir, payloads) = payload_fixture();
        let sequencer = fast(Sequencer::new(&bridge, &payloads));
        let err = sequencer.install_dropbear(SERIAL).await.unwrap_err();
        assert!(matches!(
            err,
            SequencerError::VerifyFailed { tool: "dropbearmulti" }
        ));
    }

    #[tokio::test]
    async fn test_provision_prepares_diag_on_qualcomm_devices() {
        let bridge = FakeBridge::new();
        bridge.respond("mount", writable_mounts());
        bridge.respond(
            "getprop ro.product.cpu.abilist",
            ShellOutcome::Success("arm64-v8a".into()),
        );
        bridge.respond(
            "getprop ro.board.platform",
            ShellOutcome::Success("msm8998".into()),
        );

        let (_dir, payloads) = payload_fixture();
        let sequencer = fast(Sequencer::new(&bridge, &payloads));
        let report = sequencer.provision(SERIAL).await.unwrap();

        assert!(report.dropbear_installed);
        assert!(report.iperf3_installed);
        assert!(report.diag_prepared);

        let commands = bridge.shell_commands();
        assert!(commands.contains(&"chmod 777 /dev/diag".to_string()));
        assert!(commands.contains(&"mkdir /data/local/tmp/diag_logs".to_string()));
    }

    #[tokio::test]
    async fn test_provision_skips_diag_without_qualcomm_modem() {
        let bridge = FakeBridge::new();
        bridge.respond("mount", writable_mounts());
        bridge.respond(
            "getprop ro.product.cpu.abilist",
            ShellOutcome::Success("arm64-v8a".into()),
        );
        bridge.respond(
            "getprop ro.board.platform",
            ShellOutcome::Success("exynos9820".into()),
        );

        let (_dir, payloads) = payload_fixture();
        let sequencer = fast(Sequencer::new(&bridge, &payloads));
        let report = sequencer.provision(SERIAL).await.unwrap();

        assert!(!report.diag_prepared);
        assert!(!bridge
            .shell_commands()
            .contains(&"chmod 777 /dev/diag".to_string()));
    }
}
