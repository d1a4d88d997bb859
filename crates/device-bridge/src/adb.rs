//! ADB Client
//!
//! Talks to devices through the host `adb` binary. Host-side invocations
//! (`devices`, `push`, `forward`) require a clean exit; device shell
//! commands go through `exec-out`, whose exit status mirrors the remote
//! command, so their output is classified instead.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};
use which::which;

use crate::device::{parse_device_list, Device};
use crate::outcome::ShellOutcome;

/// ADB errors
#[derive(Debug, thiserror::Error)]
pub enum AdbError {
    #[error("adb not found on host")]
    NotFound,
    #[error("{0} not found on host")]
    MissingHostTool(&'static str),
    #[error("adb command failed: {0}")]
    CommandFailed(String),
    #[error("`{0}` hit the command deadline")]
    Deadline(String),
    #[error("unexpected device response: {0}")]
    UnexpectedResponse(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Device access used by the provisioning code.
///
/// `AdbClient` is the production implementation; tests substitute a
/// recording fake.
#[async_trait]
pub trait DeviceBridge: Send + Sync {
    /// Run a shell command on the device and classify its output.
    async fn shell(&self, serial: &str, command: &str) -> Result<ShellOutcome, AdbError>;

    /// Run a shell command elevated through `su -c`.
    async fn shell_root(&self, serial: &str, command: &str) -> Result<ShellOutcome, AdbError>;

    /// Push a host file to a device path.
    async fn push(&self, serial: &str, local: &Path, remote: &str) -> Result<(), AdbError>;

    /// Forward a host TCP port to the device.
    async fn forward(&self, serial: &str, local_port: u16, remote_port: u16)
        -> Result<(), AdbError>;
}

/// ADB client
pub struct AdbClient {
    adb_path: PathBuf,
    command_timeout: Duration,
}

impl AdbClient {
    /// Locate `adb` on the host. Absence is fatal for the whole tool.
    pub fn new() -> Result<Self, AdbError> {
        let adb_path = which("adb").map_err(|_| AdbError::NotFound)?;
        debug!("using adb at {:?}", adb_path);
        Ok(Self {
            adb_path,
            command_timeout: Duration::from_secs(60),
        })
    }

    /// Deadline applied to every spawned adb command. A hung device call
    /// otherwise blocks the whole tool.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Run an adb command and require a clean exit.
    async fn run(&self, args: &[&str]) -> Result<String, AdbError> {
        let output = self.spawn(args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AdbError::CommandFailed(stderr.trim().to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run an adb command and capture stdout regardless of exit status.
    ///
    /// `exec-out` propagates the remote command's exit code, and remote
    /// commands like `pkill` legitimately exit non-zero while still
    /// producing the output we classify.
    async fn run_unchecked(&self, args: &[&str]) -> Result<String, AdbError> {
        let output = self.spawn(args).await?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn spawn(&self, args: &[&str]) -> Result<std::process::Output, AdbError> {
        debug!("adb {:?}", args);
        let future = Command::new(&self.adb_path).args(args).output();
        match tokio::time::timeout(self.command_timeout, future).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                warn!(
                    "adb {:?} did not return within {}s",
                    args,
                    self.command_timeout.as_secs()
                );
                Err(AdbError::Deadline(format!("adb {}", args.join(" "))))
            }
        }
    }

    async fn run_for_device(&self, serial: &str, args: &[&str]) -> Result<String, AdbError> {
        let mut full_args = vec!["-s", serial];
        full_args.extend(args);
        self.run(&full_args).await
    }

    /// List attached devices.
    pub async fn list_devices(&self) -> Result<Vec<Device>, AdbError> {
        let output = self.run(&["devices"]).await?;
        Ok(parse_device_list(&output))
    }

    /// Kill the adb server.
    pub async fn kill_server(&self) -> Result<(), AdbError> {
        self.run(&["kill-server"]).await?;
        Ok(())
    }

    /// Restart the adb server as root. Some devices only accept adb while
    /// tethering is active if the server runs as root; all forwards are
    /// lost across the restart.
    pub async fn restart_server_rooted(&self) -> Result<(), AdbError> {
        let sudo = which("sudo").map_err(|_| AdbError::MissingHostTool("sudo"))?;

        // kill-server exits non-zero when no server is running
        let _ = Command::new(&sudo)
            .arg(&self.adb_path)
            .arg("kill-server")
            .output()
            .await?;
        tokio::time::sleep(Duration::from_secs(2)).await;

        debug!("starting rooted adb server");
        Command::new(&sudo)
            .arg(&self.adb_path)
            .args(["-a", "nodaemon", "server", "start"])
            .spawn()?;
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    }
}

#[async_trait]
impl DeviceBridge for AdbClient {
    async fn shell(&self, serial: &str, command: &str) -> Result<ShellOutcome, AdbError> {
        match self
            .run_unchecked(&["-s", serial, "exec-out", command])
            .await
        {
            Ok(out) => Ok(ShellOutcome::classify(&out)),
            Err(AdbError::Deadline(_)) => Ok(ShellOutcome::Timeout),
            Err(err) => Err(err),
        }
    }

    async fn shell_root(&self, serial: &str, command: &str) -> Result<ShellOutcome, AdbError> {
        match self
            .run_unchecked(&["-s", serial, "exec-out", "su", "-c", command])
            .await
        {
            Ok(out) => Ok(ShellOutcome::classify(&out)),
            Err(AdbError::Deadline(_)) => Ok(ShellOutcome::Timeout),
            Err(err) => Err(err),
        }
    }

    async fn push(&self, serial: &str, local: &Path, remote: &str) -> Result<(), AdbError> {
        let local_str = local.to_string_lossy();
        self.run_for_device(serial, &["push", &local_str, remote])
            .await?;
        Ok(())
    }

    async fn forward(
        &self,
        serial: &str,
        local_port: u16,
        remote_port: u16,
    ) -> Result<(), AdbError> {
        let local = format!("tcp:{}", local_port);
        let remote = format!("tcp:{}", remote_port);
        self.run_for_device(serial, &["forward", &local, &remote])
            .await?;
        Ok(())
    }
}
