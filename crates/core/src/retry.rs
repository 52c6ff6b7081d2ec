//! Retry with exponential backoff and jitter
//!
//! Used by store adapters around each HTTP exchange. Throttling (408, 429)
//! and server-side failures (5xx) are retried, as are transport timeouts and
//! resets. Everything else is returned on the first failure.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::{Error, Result};
use crate::mount::RetryConfig;

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// `config.max_attempts` attempts have been made
pub async fn retry_with_backoff<T, F, Fut, R>(config: &RetryConfig, mut operation: F, is_retryable: R) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    R: Fn(&Error) -> bool,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if attempt >= config.max_attempts || !is_retryable(&err) {
            return Err(err);
        }

        let backoff = backoff_for(config, attempt);
        tracing::debug!(
            attempt,
            backoff_ms = backoff.as_millis() as u64,
            error = %err,
            "Retrying after transient error"
        );
        tokio::time::sleep(backoff).await;
    }
}

/// `initial * 2^(attempt-1)`, capped, plus up to the same amount of jitter
fn backoff_for(config: &RetryConfig, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(10);
    let base = config.initial_backoff_ms.saturating_mul(1u64 << exp);
    let capped = base.min(config.max_backoff_ms);
    let jitter = if capped == 0 {
        0
    } else {
        rand::rng().random_range(0..capped)
    };
    Duration::from_millis(capped + jitter)
}

/// Whether a failure is worth another attempt
pub fn is_retryable_error(error: &Error) -> bool {
    match error {
        Error::Backend { status, .. } => matches!(status, 408 | 429 | 500 | 502 | 503 | 504),
        Error::Network(msg) => {
            let msg = msg.to_lowercase();
            ["timed out", "timeout", "connection reset", "connection refused", "connection closed"]
                .iter()
                .any(|needle| msg.contains(needle))
        }
        Error::Io(e) => matches!(
            e.kind(),
            std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::TimedOut
                | std::io::ErrorKind::Interrupted
        ),
        _ => false,
    }
}
