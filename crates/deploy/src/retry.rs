//! Bounded polling with a swappable backoff.

use std::{future::Future, time::Duration};

use backon::{BackoffBuilder, ConstantBuilder, ExponentialBuilder};
use serde::{Deserialize, Serialize};

/// Shape of the delay between two attempts.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum BackoffKind {
    /// Same delay between every attempt.
    #[default]
    Constant,
    /// Delay doubles after every attempt, starting from `delay_ms`.
    Exponential,
}

/// A bounded retry policy: at most `max_attempts` attempts, with a delay between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Base delay between two attempts, in milliseconds.
    pub delay_ms: u64,
    /// How the delay evolves between attempts.
    #[serde(default)]
    pub backoff: BackoffKind,
}

impl RetryPolicy {
    /// A policy with a fixed delay between attempts.
    pub const fn constant(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay_ms: delay.as_millis() as u64,
            backoff: BackoffKind::Constant,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// The delays slept between attempts. Yields exactly `max_attempts - 1` items.
    fn delays(&self) -> Box<dyn Iterator<Item = Duration> + Send> {
        let retries = self.max_attempts.max(1) as usize - 1;
        match self.backoff {
            BackoffKind::Constant => Box::new(
                ConstantBuilder::default()
                    .with_delay(self.delay())
                    .with_max_times(retries)
                    .build(),
            ),
            BackoffKind::Exponential => Box::new(
                ExponentialBuilder::default()
                    .with_min_delay(self.delay())
                    .with_max_delay(self.delay() * 64)
                    .with_max_times(retries)
                    .build(),
            ),
        }
    }
}

/// Returned when every attempt of [`poll_until`] came back empty.
#[derive(Debug)]
pub struct RetryExhausted {
    /// How many attempts were made.
    pub attempts: u32,
    /// The error of the last attempt, if it failed rather than returning `None`.
    pub last_error: Option<anyhow::Error>,
}

/// Run `attempt_fn` until it yields a value or the policy runs out of attempts.
///
/// The closure receives the 1-based attempt number. `Ok(None)` and `Err(_)` both
/// count as a failed attempt. On success, returns the value and the number of
/// attempts it took.
pub async fn poll_until<T, F, Fut>(
    policy: &RetryPolicy,
    mut attempt_fn: F,
) -> Result<(T, u32), RetryExhausted>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = anyhow::Result<Option<T>>>,
{
    let mut delays = policy.delays();
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let last_error = match attempt_fn(attempt).await {
            Ok(Some(value)) => return Ok((value, attempt)),
            Ok(None) => None,
            Err(e) => {
                tracing::debug!(attempt, error = %e, "Probe failed");
                Some(e)
            }
        };

        match delays.next() {
            Some(delay) => {
                tracing::trace!(attempt, delay_ms = delay.as_millis() as u64, "Retrying after delay");
                tokio::time::sleep(delay).await;
            }
            None => {
                return Err(RetryExhausted {
                    attempts: attempt,
                    last_error,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn instant(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::constant(max_attempts, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_succeeds_on_third_attempt() {
        let calls = AtomicU32::new(0);
        let (value, attempts) = poll_until(&instant(5), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, anyhow::Error>((attempt == 3).then_some("ready")) }
        })
        .await
        .unwrap();

        assert_eq!(value, "ready");
        assert_eq!(attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let err = poll_until(&instant(4), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<Option<()>, anyhow::Error>(None) }
        })
        .await
        .unwrap_err();

        assert_eq!(err.attempts, 4);
        assert!(err.last_error.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_keeps_last_error() {
        let err = poll_until(&instant(2), |attempt| async move {
            Err::<Option<()>, _>(anyhow::anyhow!("boom {}", attempt))
        })
        .await
        .unwrap_err();

        assert_eq!(err.attempts, 2);
        assert_eq!(err.last_error.unwrap().to_string(), "boom 2");
    }

    #[tokio::test]
    async fn test_zero_attempts_still_tries_once() {
        let calls = AtomicU32::new(0);
        let err = poll_until(&instant(0), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<Option<()>, anyhow::Error>(None) }
        })
        .await
        .unwrap_err();

        assert_eq!(err.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delay_count_matches_attempts() {
        let policy = RetryPolicy {
            max_attempts: 5,
            delay_ms: 10,
            backoff: BackoffKind::Exponential,
        };
        let delays: Vec<_> = policy.delays().collect();
        assert_eq!(delays.len(), 4);
        assert_eq!(delays[0], Duration::from_millis(10));
        assert!(delays[3] > delays[0]);

        let delays: Vec<_> = instant(3).delays().collect();
        assert_eq!(delays, vec![Duration::ZERO, Duration::ZERO]);
    }
}
