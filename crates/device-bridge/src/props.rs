//! Capability Probes
//!
//! Property queries used to pick binary variants and feature paths. Every
//! call goes back to the device; nothing is cached.

use tracing::debug;

use crate::adb::{AdbError, DeviceBridge};

/// Platform name prefixes of Qualcomm basebands that expose /dev/diag.
const QUALCOMM_PLATFORM_PREFIXES: [&str; 3] = ["msm", "mdm", "sdm"];

/// Supported binary interfaces reported by the device, as a raw
/// comma-separated string.
pub async fn abi_list(bridge: &dyn DeviceBridge, serial: &str) -> Result<String, AdbError> {
    let outcome = bridge
        .shell(serial, "getprop ro.product.cpu.abilist")
        .await?;
    Ok(outcome.stdout().unwrap_or_default().trim().to_string())
}

/// Whether the device carries a Qualcomm baseband, inferred from the board
/// platform name.
pub async fn has_qualcomm_modem(bridge: &dyn DeviceBridge, serial: &str) -> Result<bool, AdbError> {
    let outcome = bridge
        .shell_root(serial, "getprop ro.board.platform")
        .await?;
    let platform = outcome.stdout().unwrap_or_default();
    debug!("board platform: {}", platform.trim());
    Ok(is_qualcomm_platform(platform))
}

/// True if the board platform string names a Qualcomm baseband.
pub fn is_qualcomm_platform(platform: &str) -> bool {
    let platform = platform.trim();
    QUALCOMM_PLATFORM_PREFIXES
        .iter()
        .any(|prefix| platform.starts_with(prefix))
}

/// Android major version, used as the key into the tethering fallback
/// table.
pub async fn android_major_version(
    bridge: &dyn DeviceBridge,
    serial: &str,
) -> Result<u32, AdbError> {
    let outcome = bridge
        .shell(serial, "getprop ro.build.version.release")
        .await?;
    let release = outcome.stdout().unwrap_or_default().trim().to_string();
    parse_major_version(&release)
        .ok_or_else(|| AdbError::UnexpectedResponse(format!("Android version {:?}", release)))
}

/// Major version from a release string, e.g. `7.1.2` -> 7.
pub fn parse_major_version(release: &str) -> Option<u32> {
    release.trim().split('.').next()?.parse().ok()
}
