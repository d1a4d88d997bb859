//! Shell Command Outcomes
//!
//! Output captured from a device shell command is classified once, here,
//! into structured variants. Callers match on the enum instead of scanning
//! raw output for marker strings.

/// Outcome of a device shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellOutcome {
    /// The command ran; captured stdout.
    Success(String),
    /// The invoked binary or path does not exist on the device.
    NotFound,
    /// The shell refused the operation.
    PermissionDenied,
    /// The command produced no result within the deadline.
    Timeout,
}

impl ShellOutcome {
    /// Classify raw `exec-out` output.
    pub fn classify(raw: &str) -> Self {
        if raw.contains("not found") || raw.contains("No such file or directory") {
            return ShellOutcome::NotFound;
        }
        if raw.contains("Permission denied") || raw.contains("Operation not permitted") {
            return ShellOutcome::PermissionDenied;
        }
        ShellOutcome::Success(raw.to_string())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ShellOutcome::Success(_))
    }

    /// Captured stdout, if the command succeeded.
    pub fn stdout(&self) -> Option<&str> {
        match self {
            ShellOutcome::Success(out) => Some(out),
            _ => None,
        }
    }
}
