//! Retry policy for transient network failures.
//!
//! Transience is decided by [`trellis_domain::Error::is_transient`]
//! (connection reset/refused, timeouts, name resolution, "fetch failed",
//! "socket hang up"). Backoff is linear: attempt `n` sleeps
//! `n * backoff_ms` before retrying.

use std::future::Future;
use std::time::Duration;

use trellis_domain::error::Result;

/// Run `op` with up to `max_attempts` tries.
///
/// Non-transient errors are returned immediately; the last transient
/// error is returned once attempts are exhausted.
pub async fn with_retry<T, F, Fut>(max_attempts: u32, backoff_ms: u64, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = max_attempts.max(1);
    let mut last_err = None;

    for attempt in 1..=attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < attempts => {
                let delay = Duration::from_millis(backoff_ms * attempt as u64);
                tracing::warn!(
                    attempt,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    // Unreachable unless the last attempt errored transiently, in which
    // case last_err is set.
    Err(last_err.unwrap_or_else(|| trellis_domain::Error::Other("retry exhausted".into())))
}
