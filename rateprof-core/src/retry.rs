//! Backoff policy shared by the embedding and vector index clients.
//!
//! Only transport failures, `429` and `5xx` are worth another attempt; every
//! other failure is returned to the caller straight away.

use std::time::Duration;

use tokio_retry::strategy::{jitter, ExponentialBackoff};

use crate::config::RetryConfig;

/// Delays between attempts. Yields `max_retries` items, so the total number
/// of attempts is `max_retries + 1`.
pub fn backoff(config: &RetryConfig) -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(config.retry_delay_ms.max(1))
        .max_delay(Duration::from_millis(config.max_delay_ms))
        .map(jitter)
        .take(config.max_retries)
}

pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}
