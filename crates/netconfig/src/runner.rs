//! Host Command Runner
//!
//! Executes privileged host networking commands through sudo. The exit
//! status is checked on every call: a rejected rule is an error for the
//! operator, not a silent no-op.

use std::path::PathBuf;

use tokio::process::Command;
use tracing::debug;
use which::which;

#[derive(Debug, thiserror::Error)]
pub enum HostCmdError {
    #[error("{0} not found on host")]
    MissingTool(&'static str),
    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Runs `sudo <argv>` host commands.
pub struct HostRunner {
    sudo: PathBuf,
}

impl HostRunner {
    pub fn new() -> Result<Self, HostCmdError> {
        let sudo = which("sudo").map_err(|_| HostCmdError::MissingTool("sudo"))?;
        Ok(Self { sudo })
    }

    /// Run a command elevated and fail on a non-zero exit.
    pub async fn run(&self, argv: &[String]) -> Result<(), HostCmdError> {
        debug!("sudo {}", argv.join(" "));
        let output = Command::new(&self.sudo).args(argv).output().await?;

        if !output.status.success() {
            return Err(HostCmdError::Failed {
                command: argv.join(" "),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Owned argv from string literals and computed parts.
pub(crate) fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}
