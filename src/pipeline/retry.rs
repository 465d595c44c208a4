//! Bounded retry around a single provider call.

use crate::error::ProviderError;
use std::time::Duration;

/// How often, and how patiently, a failing call is repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one.
    pub max_retries: u32,
    /// Minimum pause between attempts. A provider `Retry-After` wins if longer.
    pub delay: Duration,
    /// Upper bound on any single pause.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: crate::defaults::MAX_RETRIES,
            delay: Duration::ZERO,
            max_delay: Duration::from_secs(crate::defaults::MAX_RETRY_AFTER_SECS),
        }
    }
}

/// Result of a retried call plus how many calls it took.
#[derive(Debug)]
pub struct Attempts<T> {
    pub result: Result<T, ProviderError>,
    pub attempts: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Pause before the next attempt after `error`, never above `max_delay`.
    pub fn pause_for(&self, error: &ProviderError) -> Duration {
        error
            .retry_after()
            .map_or(self.delay, |d| d.max(self.delay))
            .min(self.max_delay)
    }

    /// Call `operation` until it succeeds, fails terminally, or retries run out.
    ///
    /// Only transient errors are retried. The last error is returned unchanged.
    /// `operation` receives the 1-based attempt number.
    pub fn run<T>(&self, mut operation: impl FnMut(u32) -> Result<T, ProviderError>) -> Attempts<T> {
        let mut attempt = 1;
        loop {
            match operation(attempt) {
                Ok(value) => {
                    return Attempts {
                        result: Ok(value),
                        attempts: attempt,
                    };
                }
                Err(error) if error.is_transient() && attempt <= self.max_retries => {
                    let pause = self.pause_for(&error);
                    tracing::warn!(
                        attempt,
                        max_retries = self.max_retries,
                        pause_ms = pause.as_millis() as u64,
                        error = %error,
                        "transient provider failure, retrying"
                    );
                    if !pause.is_zero() {
                        std::thread::sleep(pause);
                    }
                    attempt += 1;
                }
                Err(error) => {
                    return Attempts {
                        result: Err(error),
                        attempts: attempt,
                    };
                }
            }
        }
    }
}

/// Shorthand for `RetryPolicy::new(max_retries).run(operation).result`.
pub fn with_retries<T>(
    max_retries: u32,
    operation: impl FnMut(u32) -> Result<T, ProviderError>,
) -> Result<T, ProviderError> {
    RetryPolicy::new(max_retries).run(operation).result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn outage() -> ProviderError {
        ProviderError::Server {
            status: 503,
            message: "unavailable".to_string(),
        }
    }

    #[test]
    fn test_success_first_try() {
        let outcome = RetryPolicy::new(2).run(|_| Ok::<_, ProviderError>("text"));
        assert_eq!(outcome.result.unwrap(), "text");
        assert_eq!(outcome.attempts, 1);
    }

    #[test]
    fn test_k_failures_then_success_uses_k_plus_one_calls() {
        for k in 0..=3 {
            let mut calls = 0;
            let outcome = RetryPolicy::new(3).run(|_| {
                calls += 1;
                if calls <= k { Err(outage()) } else { Ok(calls) }
            });
            assert_eq!(outcome.result.unwrap(), k + 1);
            assert_eq!(outcome.attempts, k + 1);
        }
    }

    #[test]
    fn test_exhaustion_returns_last_error_unchanged() {
        let mut calls = 0;
        let outcome = RetryPolicy::new(2).run(|attempt| -> Result<(), _> {
            calls += 1;
            Err(ProviderError::Network {
                message: format!("reset on attempt {attempt}"),
            })
        });
        assert_eq!(calls, 3);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(
            outcome.result.unwrap_err(),
            ProviderError::Network {
                message: "reset on attempt 3".to_string()
            }
        );
    }

    #[test]
    fn test_terminal_error_is_not_retried() {
        let mut calls = 0;
        let outcome = RetryPolicy::new(5).run(|_| -> Result<(), _> {
            calls += 1;
            Err(ProviderError::Auth {
                message: "invalid key".to_string(),
            })
        });
        assert_eq!(calls, 1);
        assert_eq!(outcome.attempts, 1);
        assert!(matches!(outcome.result, Err(ProviderError::Auth { .. })));
    }

    #[test]
    fn test_zero_retries_means_single_call() {
        let mut calls = 0;
        let result = with_retries(0, |_| -> Result<(), _> {
            calls += 1;
            Err(outage())
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_retry_after_is_honored() {
        let mut calls = 0;
        let start = Instant::now();
        let outcome = RetryPolicy::new(1).run(|_| {
            calls += 1;
            if calls == 1 {
                Err(ProviderError::RateLimited {
                    message: "slow down".to_string(),
                    retry_after: Some(Duration::from_millis(30)),
                })
            } else {
                Ok(())
            }
        });
        assert!(outcome.result.is_ok());
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_long_retry_after_is_capped() {
        let policy = RetryPolicy::new(1).with_max_delay(Duration::from_millis(20));
        let error = ProviderError::RateLimited {
            message: "slow down".to_string(),
            retry_after: Some(Duration::from_secs(86_400)),
        };
        assert_eq!(policy.pause_for(&error), Duration::from_millis(20));

        let mut calls = 0;
        let start = Instant::now();
        let outcome = policy.run(|_| {
            calls += 1;
            if calls == 1 { Err(error.clone()) } else { Ok(()) }
        });
        assert!(outcome.result.is_ok());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_pause_uses_delay_floor() {
        let policy = RetryPolicy::new(1).with_delay(Duration::from_millis(50));
        assert_eq!(policy.pause_for(&outage()), Duration::from_millis(50));
        let short = ProviderError::RateLimited {
            message: "slow down".to_string(),
            retry_after: Some(Duration::from_millis(10)),
        };
        assert_eq!(policy.pause_for(&short), Duration::from_millis(50));
    }
}
