//! Retry-with-backoff wrapper for external capability calls.
//!
//! HTTP 429 / 5xx errors from model APIs are transient and frequent under
//! concurrent load. Exponential backoff (`backoff_ms * 2^(attempt-1)`)
//! avoids thundering-herd: with 500 ms base and 3 retries the wait sequence
//! is 500 ms → 1 s → 2 s, totalling under 4 s of back-off per unit.
//!
//! Both the summarizer and the embedder go through [`with_backoff`] so the
//! policy lives in one place instead of being duplicated per call site.

use crate::capability::CapabilityError;
use std::future::Future;
use tokio::time::{sleep, Duration};
use tracing::warn;

/// Retry parameters, lifted from the run configuration.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_ms: u64,
}

/// Why a retried operation ultimately gave up.
#[derive(Debug, Clone)]
pub enum RetryError {
    /// Every attempt failed transiently; `attempts` calls were made.
    Exhausted { attempts: u32, last: String },
    /// The capability reported a non-retryable failure.
    Permanent(String),
}

impl RetryError {
    pub fn detail(&self) -> &str {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Permanent(detail) => detail,
        }
    }
}

/// Run `op` up to `1 + max_retries` times, backing off between attempts.
///
/// A [`CapabilityError::RateLimited`] with a server-specified delay overrides
/// the computed backoff for that attempt. Permanent errors short-circuit
/// immediately — retrying a 400 only burns quota.
pub async fn with_backoff<T, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CapabilityError>>,
{
    let mut last_err: Option<CapabilityError> = None;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            let backoff = match &last_err {
                Some(CapabilityError::RateLimited {
                    retry_after_secs: Some(secs),
                }) => *secs * 1000,
                _ => policy.backoff_ms * 2u64.pow(attempt - 1),
            };
            warn!(
                "{}: retry {}/{} after {}ms",
                label, attempt, policy.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => {
                warn!("{}: attempt {} failed — {}", label, attempt + 1, err);
                last_err = Some(err);
            }
            Err(err) => return Err(RetryError::Permanent(err.to_string())),
        }
    }

    Err(RetryError::Exhausted {
        attempts: policy.max_retries + 1,
        last: last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            backoff_ms: 1,
        }
    }

    #[tokio::test]
    async fn succeeds_first_try() {
        let calls = AtomicU32::new(0);
        let result = with_backoff(policy(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, CapabilityError>(42) }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_backoff(policy(), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(CapabilityError::Transient("blip".into()))
                } else {
                    Ok(7)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_after_max_retries() {
        let calls = AtomicU32::new(0);
        let err = with_backoff(policy(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<u32, _>(CapabilityError::Transient("down".into())) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, RetryError::Exhausted { attempts: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_error_short_circuits() {
        let calls = AtomicU32::new(0);
        let err = with_backoff(policy(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<u32, _>(CapabilityError::Permanent("bad payload".into())) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, RetryError::Permanent(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
