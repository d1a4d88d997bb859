//! Bounded Polling
//!
//! The device applies remounts, process kills, and tethering changes
//! asynchronously. Instead of fixed sleeps, wait for an observable
//! condition with an explicit deadline and surface expiry as an error.

use std::future::Future;
use std::time::Duration;

use crate::adb::AdbError;

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error(transparent)]
    Adb(#[from] AdbError),
    #[error("timed out after {1:?} waiting for {0}")]
    Timeout(&'static str, Duration),
}

/// Default spacing between condition checks.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Poll `check` every `interval` until it reports true or `timeout`
/// expires.
pub async fn poll_until<F, Fut>(
    condition: &'static str,
    timeout: Duration,
    interval: Duration,
    mut check: F,
) -> Result<(), PollError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, AdbError>>,
{
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        if check().await? {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(PollError::Timeout(condition, timeout));
        }
        tokio::time::sleep(interval).await;
    }
}
