//! Qualcomm Diag Logging
//!
//! Opens up the baseband diag node and stages the logging-mask config so
//! diag_mdlog can run on the UE.

use tracing::info;
use ue_lab_device_bridge::DeviceBridge;

use crate::payloads::PayloadStore;
use crate::sequencer::SequencerError;

/// Directory on the device receiving diag_mdlog output.
pub const DIAG_LOG_DIR: &str = "/data/local/tmp/diag_logs";

/// Make the diag node world-accessible and stage the mask config.
pub async fn prepare_diag_logging(
    bridge: &dyn DeviceBridge,
    payloads: &PayloadStore,
    serial: &str,
) -> Result<(), SequencerError> {
    info!("preparing diag logging on {serial}");
    bridge.shell_root(serial, "chmod 777 /dev/diag").await?;
    bridge
        .shell_root(serial, &format!("mkdir {DIAG_LOG_DIR}"))
        .await?;
    bridge
        .shell_root(serial, &format!("chmod 777 {DIAG_LOG_DIR}"))
        .await?;

    let config = payloads.diag_config()?;
    bridge.push(serial, &config, DIAG_LOG_DIR).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{payload_fixture, FakeBridge};

    #[tokio::test]
    async fn test_diag_staging() {
        let bridge = FakeBridge::new();
        let (_dir, payloads) = payload_fixture();

        prepare_diag_logging(&bridge, &payloads, "ABC123").await.unwrap();

        let commands = bridge.shell_commands();
        assert_eq!(
            commands,
            vec![
                "chmod 777 /dev/diag",
                "mkdir /data/local/tmp/diag_logs",
                "chmod 777 /data/local/tmp/diag_logs",
            ]
        );
        let pushes = bridge.pushes();
        assert_eq!(pushes.len(), 1);
        assert!(pushes[0].0.ends_with("ue_diag.cfg"));
        assert_eq!(pushes[0].1, DIAG_LOG_DIR);
    }
}
