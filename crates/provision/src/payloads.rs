//! Payload Store
//!
//! On-disk layout of the binary artifacts bundled with the provisioner.
//! The blobs themselves are opaque; only their arrangement and the ABI
//! selection rule live here.

use std::path::{Path, PathBuf};

/// Binary name of the SSH multiplexer.
pub const DROPBEAR_BIN: &str = "dropbearmulti";

/// Binary name of the throughput tool.
pub const IPERF3_BIN: &str = "iperf3.9";

/// Device CPU architecture, selected from `ro.product.cpu.abilist`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAbi {
    Arm64V8a,
    ArmeabiV7a,
}

impl DeviceAbi {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceAbi::Arm64V8a => "arm64-v8a",
            DeviceAbi::ArmeabiV7a => "armeabi-v7a",
        }
    }

    /// Pick the supported ABI from the device's reported list, preferring
    /// 64-bit when both are present.
    pub fn from_abi_list(abilist: &str) -> Option<Self> {
        if abilist.contains("arm64-v8a") {
            Some(DeviceAbi::Arm64V8a)
        } else if abilist.contains("armeabi-v7a") {
            Some(DeviceAbi::ArmeabiV7a)
        } else {
            None
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("payload missing: {0}")]
    Missing(PathBuf),
}

/// Resolves bundled artifacts under the configured payload directory.
#[derive(Debug, Clone)]
pub struct PayloadStore {
    root: PathBuf,
}

impl PayloadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn dropbearmulti(&self) -> Result<PathBuf, PayloadError> {
        self.required(self.root.join("dropbear").join(DROPBEAR_BIN))
    }

    pub fn iperf3(&self, abi: DeviceAbi) -> Result<PathBuf, PayloadError> {
        self.required(self.root.join("iperf3").join(abi.as_str()).join(IPERF3_BIN))
    }

    /// Logging-mask config consumed by diag_mdlog.
    pub fn diag_config(&self) -> Result<PathBuf, PayloadError> {
        self.required(self.root.join("ue_diag.cfg"))
    }

    /// Pre-generated dropbear host key, if bundled.
    pub fn host_key(&self) -> Option<PathBuf> {
        self.optional(self.root.join("dropbear").join("dropbear_ecdsa_host_key"))
    }

    /// authorized_keys file staged next to the host key, if bundled.
    pub fn authorized_keys(&self) -> Option<PathBuf> {
        self.optional(self.root.join("dropbear").join("authorized_keys"))
    }

    fn required(&self, path: PathBuf) -> Result<PathBuf, PayloadError> {
        if path.is_file() {
            Ok(path)
        } else {
            Err(PayloadError::Missing(path))
        }
    }

    fn optional(&self, path: PathBuf) -> Option<PathBuf> {
        path.is_file().then_some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::payload_fixture;

    #[test]
    fn test_abi_selection_prefers_64bit() {
        let abilist = "arm64-v8a,armeabi-v7a,armeabi";
        assert_eq!(DeviceAbi::from_abi_list(abilist), Some(DeviceAbi::Arm64V8a));
    }

    #[test]
    fn test_abi_selection_32bit_only() {
        assert_eq!(
            DeviceAbi::from_abi_list("armeabi-v7a,armeabi"),
            Some(DeviceAbi::ArmeabiV7a)
        );
    }

    #[test]
    fn test_abi_selection_unsupported() {
        assert_eq!(DeviceAbi::from_abi_list("x86_64,x86"), None);
        assert_eq!(DeviceAbi::from_abi_list(""), None);
    }

    #[test]
    fn test_iperf3_path_follows_abi() {
        let (_dir, store) = payload_fixture();
        let path = store.iperf3(DeviceAbi::Arm64V8a).unwrap();
        assert!(path.ends_with("iperf3/arm64-v8a/iperf3.9"));
    }

    #[test]
    fn test_missing_payload_is_an_error() {
        let store = PayloadStore::new("/nonexistent");
        assert!(matches!(
            store.dropbearmulti(),
            Err(PayloadError::Missing(_))
        ));
        assert!(store.host_key().is_none());
    }
}
