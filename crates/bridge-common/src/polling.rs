//! Bounded polling
//!
//! Used at startup to wait for a cluster capability without blocking forever.

use std::future::Future;
use std::time::{Duration, Instant};

/// Interval between capability checks at startup
pub const CAPABILITY_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// How long startup waits for a capability before giving up
pub const CAPABILITY_POLL_TIMEOUT: Duration = Duration::from_secs(300);

/// Poll until `poll_fn` yields a value or `timeout` expires.
///
/// `poll_fn` returns `Ok(Some(T))` when ready, `Ok(None)` to keep waiting,
/// or `Err(msg)` for a failed attempt, which is logged and retried.
pub async fn wait_for_resource<T, F, Fut>(
    description: &str,
    timeout: Duration,
    poll_interval: Duration,
    mut poll_fn: F,
) -> Result<T, String>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, String>>,
{
    let start = Instant::now();

    loop {
        if start.elapsed() > timeout {
            return Err(format!(
                "Timeout after {:?} waiting for {}",
                timeout, description
            ));
        }

        match poll_fn().await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Poll error for {}, retrying...", description);
            }
        }

        tokio::time::sleep(poll_interval).await;
    }
}
