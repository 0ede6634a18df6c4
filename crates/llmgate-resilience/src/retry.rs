use std::future::Future;
use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Delay between attempt `n` and `n+1` (0-indexed): `min(base * 2^n, max)`,
    /// jittered by up to ±25% when enabled.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = 2u32.saturating_pow(attempt);
        let scaled = self.base_delay.saturating_mul(exp).min(self.max_delay);
        if !self.jitter {
            return scaled;
        }
        let factor = rand::rng().random_range(0.75..=1.25);
        Duration::from_secs_f64(scaled.as_secs_f64() * factor)
    }
}

/// Whether an error observed while calling the upstream should be retried.
/// Only transient network-level timeouts qualify: HTTP status errors must
/// never be retried, since many upstream endpoints are non-idempotent and a
/// stream may already have been partially consumed by the client.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("retry canceled")]
    Canceled,
    #[error(transparent)]
    Exhausted(E),
}

/// Runs `attempt` up to `config.max_attempts` times, sleeping a backoff
/// delay between attempts that return a retryable error. The sleep is
/// canceled, and `RetryError::Canceled` returned, if `canceled` resolves
/// first.
pub async fn run<F, Fut, T, E>(
    config: &RetryConfig,
    mut canceled: impl Future<Output = ()> + Unpin,
    mut attempt: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable,
{
    let mut last_err = None;
    for n in 0..config.max_attempts {
        match attempt(n).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let retryable = err.is_retryable();
                last_err = Some(err);
                if !retryable || n + 1 >= config.max_attempts {
                    break;
                }
                let delay = config.backoff(n);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = &mut canceled => return Err(RetryError::Canceled),
                }
            }
        }
    }
    Err(RetryError::Exhausted(last_err.expect("at least one attempt ran")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::pending;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Transient;
    impl Retryable for Transient {
        fn is_retryable(&self) -> bool {
            true
        }
    }

    #[derive(Debug)]
    struct Permanent;
    impl Retryable for Permanent {
        fn is_retryable(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig {
            max_attempts: 5,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter: false,
        };
        let result: Result<u32, RetryError<Transient>> =
            run(&config, Box::pin(pending()), |n| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(Transient)
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn never_retries_permanent_errors() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::default();
        let result: Result<u32, RetryError<Permanent>> =
            run(&config, Box::pin(pending()), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Permanent) }
            })
            .await;
        assert!(matches!(result, Err(RetryError::Exhausted(Permanent))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_aborts_the_sleep() {
        let config = RetryConfig {
            max_attempts: 5,
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(10),
            jitter: false,
        };
        let result: Result<u32, RetryError<Transient>> =
            run(&config, Box::pin(tokio::time::sleep(Duration::from_millis(5))), |_| async {
                Err(Transient)
            })
            .await;
        assert!(matches!(result, Err(RetryError::Canceled)));
    }
}
