//! Exponential-backoff retry utility (§4.10)
//!
//! Used by external-API adapters only — transactional DB operations have
//! their own serialization-retry policy inside the store (§4.1, §5).

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Trait implemented by every adapter error enum so the resilience utility
/// can classify failures without string-matching at the call site.
pub trait Classify {
    /// True if a retry might succeed (5xx, network, timeout). False for
    /// auth (401/403), quota (402/429 w/ quota), and not-found (404).
    fn is_retryable(&self) -> bool;
}

impl Classify for crate::errors::LlmError {
    fn is_retryable(&self) -> bool {
        crate::errors::LlmError::is_retryable(self)
    }
}

impl Classify for crate::errors::EmbeddingError {
    fn is_retryable(&self) -> bool {
        crate::errors::EmbeddingError::is_retryable(self)
    }
}

impl Classify for crate::errors::ExternalError {
    fn is_retryable(&self) -> bool {
        crate::errors::ExternalError::is_retryable(self)
    }
}

/// Tuning for `with_retry`, defaults matching spec.md §4.10
#[derive(Debug, Clone, Copy)]
pub struct RetryOptions {
    pub retries: u32,
    pub factor: f64,
    pub min_timeout_ms: u64,
    pub max_timeout_ms: u64,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            retries: 3,
            factor: 2.0,
            min_timeout_ms: 1000,
            max_timeout_ms: 10_000,
        }
    }
}

impl RetryOptions {
    /// Sleep duration before attempt number `attempt` (1-indexed):
    /// `min(minTimeout * factor^(attempt-1), maxTimeout)`, with up to 20%
    /// positive jitter.
    fn backoff_for(&self, attempt: u32) -> Duration {
        let base = self.min_timeout_ms as f64 * self.factor.powi(attempt as i32 - 1);
        let capped = base.min(self.max_timeout_ms as f64);
        let jitter = rand::thread_rng().gen_range(0.0..0.2);
        Duration::from_millis((capped * (1.0 + jitter)) as u64)
    }
}

/// Retry `operation` up to `opts.retries` times with jittered exponential
/// backoff, skipping the retry loop entirely for non-retryable errors.
pub async fn with_retry<F, Fut, T, E>(name: &str, opts: RetryOptions, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classify + std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt > opts.retries || !err.is_retryable() {
                    return Err(err);
                }
                let delay = opts.backoff_for(attempt);
                warn!(
                    "{name} failed on attempt {attempt}/{}: {err}; retrying in {delay:?}",
                    opts.retries + 1
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ExternalError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry("test-op", RetryOptions::default(), || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(ExternalError::NetworkError("boom".into()))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn never_retries_non_retryable_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<i32, ExternalError> = with_retry("test-op", RetryOptions::default(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ExternalError::ApiError {
                status: 401,
                message: "Unauthorized".into(),
            })
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_exhausting_retries() {
        let calls = AtomicU32::new(0);
        let opts = RetryOptions {
            retries: 2,
            min_timeout_ms: 1,
            max_timeout_ms: 2,
            ..Default::default()
        };
        let result: Result<i32, ExternalError> = with_retry("test-op", opts, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ExternalError::NetworkError("still down".into()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
