// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Bounded retry/backoff middleware.
//!
//! Wraps SNS and Pub/Sub publish calls (spec §4.2, §7: "SNS and Pub/Sub
//! publishes are wrapped in bounded retry"). SQS and Redis publish paths
//! call the transport directly and do not go through this crate.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, warn};

/// Exponential-backoff-with-jitter retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the initial attempt. `0`
    /// means only the initial attempt (no retries).
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    #[serde(with = "duration_millis")]
    pub base_delay: Duration,
    /// Maximum delay cap for exponential backoff.
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,
    /// Overall wall-clock budget across all attempts.
    #[serde(with = "duration_millis")]
    pub overall_timeout: Duration,
    /// Jitter factor in `[0.0, 1.0]`. `0.0` = no jitter, `1.0` = full jitter.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            overall_timeout: Duration::from_secs(30),
            jitter_factor: 0.5,
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(val: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        val.as_millis().serialize(ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        let ms: u64 = u64::deserialize(de)?;
        Ok(Duration::from_millis(ms))
    }
}

/// Compute the backoff delay for a given zero-indexed attempt number.
pub fn compute_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exp = 2u64.saturating_pow(attempt);
    let delay_ms = (policy.base_delay.as_millis() as u64).saturating_mul(exp);
    let capped_ms = delay_ms.min(policy.max_delay.as_millis() as u64);

    let jitter_factor = policy.jitter_factor.clamp(0.0, 1.0);
    if jitter_factor > 0.0 && capped_ms > 0 {
        let jitter_range = (capped_ms as f64 * jitter_factor) as u64;
        let nanos = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos() as u64;
        let pseudo = nanos.wrapping_mul(attempt as u64 + 1);
        let jitter = if jitter_range > 0 { pseudo % jitter_range } else { 0 };
        Duration::from_millis(capped_ms.saturating_sub(jitter))
    } else {
        Duration::from_millis(capped_ms)
    }
}

/// Generic retry loop. Calls `op` up to `policy.max_retries + 1` times with
/// exponential backoff, returning the first successful result.
///
/// `retryable` decides whether a given error is worth retrying at all;
/// non-retryable errors return immediately on the first failure.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, mut op: F, retryable: fn(&E) -> bool) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let start = Instant::now();
    let max_attempts = policy.max_retries + 1;

    for attempt in 0..max_attempts {
        match op().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(target: "hedwig.retry", attempt, "publish succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                let is_last = attempt + 1 >= max_attempts;
                if !retryable(&err) {
                    debug!(target: "hedwig.retry", %err, "non-retryable error, giving up");
                    return Err(err);
                }
                if is_last {
                    warn!(target: "hedwig.retry", %err, attempt, "retries exhausted");
                    return Err(err);
                }

                let delay = compute_delay(policy, attempt);
                let remaining = policy.overall_timeout.saturating_sub(start.elapsed());
                if delay >= remaining {
                    warn!(target: "hedwig.retry", %err, "overall retry timeout exceeded");
                    return Err(err);
                }

                warn!(target: "hedwig.retry", %err, attempt, delay_ms = delay.as_millis() as u64, "retrying after backoff");
                tokio::time::sleep(delay).await;
            }
        }
    }

    unreachable!("loop always returns by the final attempt")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            overall_timeout: Duration::from_secs(5),
            jitter_factor: 0.0,
        }
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt() {
        let policy = fast_policy();
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = retry(
            &policy,
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            },
            |_| true,
        )
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let policy = fast_policy();
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = retry(
            &policy,
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("transient".to_string())
                    } else {
                        Ok(99)
                    }
                }
            },
            |_| true,
        )
        .await;
        assert_eq!(result.unwrap(), 99);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_returns_immediately() {
        let policy = fast_policy();
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = retry(
            &policy,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("fatal".to_string()) }
            },
            |_| false,
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_retries_and_returns_last_error() {
        let policy = RetryPolicy {
            max_retries: 2,
            ..fast_policy()
        };
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = retry(
            &policy,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("persistent".to_string()) }
            },
            |_| true,
        )
        .await;
        assert_eq!(result.unwrap_err(), "persistent");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn compute_delay_respects_cap() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
            jitter_factor: 0.0,
            ..fast_policy()
        };
        assert_eq!(compute_delay(&policy, 0), Duration::from_millis(100));
        assert_eq!(compute_delay(&policy, 1), Duration::from_millis(200));
        assert_eq!(compute_delay(&policy, 5), Duration::from_millis(300));
    }

    #[test]
    fn policy_serializes_as_millis() {
        let policy = RetryPolicy::default();
        let json = serde_json::to_value(&policy).unwrap();
        assert_eq!(json["base_delay"], serde_json::json!(100));
    }
}
