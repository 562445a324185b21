use std::future::Future;
use std::time::Duration;

use rand::Rng;

/// Bounded exponential backoff: attempt `retries + 1` times, sleeping
/// `base * 2^attempt` plus up to 100ms of jitter between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Additional attempts after the first.
    pub retries: u32,
    /// Base sleep before the first retry.
    pub base: Duration,
}

impl BackoffPolicy {
    pub fn new(retries: u32, base: Duration) -> Self {
        Self { retries, base }
    }

    /// Total attempts this policy permits.
    pub fn max_attempts(&self) -> u32 {
        self.retries + 1
    }

    /// Sleep duration after a failed attempt (0-indexed), jittered.
    fn backoff_after(&self, attempt: u32) -> Duration {
        let exp = self.base.saturating_mul(1 << attempt.min(16));
        let jitter = rand::thread_rng().gen_range(0..100);
        exp + Duration::from_millis(jitter)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            retries: 2,
            base: Duration::from_millis(250),
        }
    }
}

/// Discriminated result of a retried operation: either it succeeded on
/// some attempt, or every attempt failed and the last error explains why.
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Success { value: T, attempts: u32 },
    Exhausted { last_error: E, attempts: u32 },
}

impl<T, E> RetryOutcome<T, E> {
    pub fn success(self) -> Option<T> {
        match self {
            RetryOutcome::Success { value, .. } => Some(value),
            RetryOutcome::Exhausted { .. } => None,
        }
    }
}

/// Run `op` under the policy. The operation receives the 0-indexed attempt
/// number; backoff sleeps happen between attempts, never after the last.
pub async fn run_with_retry<T, E, F, Fut>(policy: BackoffPolicy, mut op: F) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max = policy.max_attempts();
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(value) => {
                return RetryOutcome::Success {
                    value,
                    attempts: attempt + 1,
                }
            }
            Err(err) if attempt + 1 >= max => {
                return RetryOutcome::Exhausted {
                    last_error: err,
                    attempts: attempt + 1,
                }
            }
            Err(_) => {
                tokio::time::sleep(policy.backoff_after(attempt)).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn quick_policy(retries: u32) -> BackoffPolicy {
        BackoffPolicy::new(retries, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn succeeds_first_try_without_sleeping() {
        let outcome: RetryOutcome<u32, &str> =
            run_with_retry(quick_policy(3), |_| async { Ok(7) }).await;
        match outcome {
            RetryOutcome::Success { value, attempts } => {
                assert_eq!(value, 7);
                assert_eq!(attempts, 1);
            }
            RetryOutcome::Exhausted { .. } => panic!("expected success"),
        }
    }

    #[tokio::test]
    async fn retries_until_success() {
        let tries = AtomicU32::new(0);
        let outcome: RetryOutcome<u32, &str> = run_with_retry(quick_policy(3), |_| {
            let n = tries.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("ainda não")
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        match outcome {
            RetryOutcome::Success { attempts, .. } => assert_eq!(attempts, 3),
            RetryOutcome::Exhausted { .. } => panic!("expected success on third attempt"),
        }
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let tries = AtomicU32::new(0);
        let outcome: RetryOutcome<(), String> = run_with_retry(quick_policy(2), |attempt| {
            tries.fetch_add(1, Ordering::SeqCst);
            async move { Err(format!("falha {attempt}")) }
        })
        .await;
        match outcome {
            RetryOutcome::Exhausted {
                last_error,
                attempts,
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(last_error, "falha 2");
            }
            RetryOutcome::Success { .. } => panic!("expected exhaustion"),
        }
        assert_eq!(tries.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_retries_means_single_attempt() {
        let tries = AtomicU32::new(0);
        let outcome: RetryOutcome<(), &str> = run_with_retry(quick_policy(0), |_| {
            tries.fetch_add(1, Ordering::SeqCst);
            async { Err("nope") }
        })
        .await;
        assert!(outcome.success().is_none());
        assert_eq!(tries.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_grows_exponentially() {
        let policy = BackoffPolicy::new(3, Duration::from_millis(250));
        // Jitter adds at most 100ms on top of the exponential base.
        let b0 = policy.backoff_after(0);
        let b2 = policy.backoff_after(2);
        assert!(b0 >= Duration::from_millis(250) && b0 < Duration::from_millis(350));
        assert!(b2 >= Duration::from_millis(1000) && b2 < Duration::from_millis(1100));
    }
}
