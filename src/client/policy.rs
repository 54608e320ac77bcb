use crate::config::RetryConfig;
use crate::Error;
use std::time::Duration;

/// Internal decision for how to proceed after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decision {
    Retry { delay: Duration },
    Fail,
}

/// Bounded exponential backoff.
///
/// Important constraints:
/// - `attempt` is 0-based (first failure => attempt=0).
/// - A server-provided `Retry-After` hint replaces the computed delay, still capped by `max_delay`.
#[derive(Debug, Clone)]
pub(crate) struct RetryPolicy {
    pub max_retries: u32,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn from_config(cfg: &RetryConfig) -> Self {
        let min_delay_ms = cfg.min_delay.as_millis() as u64;
        let max_delay_ms = (cfg.max_delay.as_millis() as u64).max(min_delay_ms);
        Self {
            max_retries: cfg.max_retries,
            min_delay_ms,
            max_delay_ms,
        }
    }

    pub fn backoff_delay(&self, attempt: u32, retry_after_ms: Option<u32>) -> Duration {
        let base = if self.min_delay_ms == 0 {
            0
        } else {
            // exponential backoff: min_delay * 2^attempt
            let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
            self.min_delay_ms.saturating_mul(factor)
        };
        let chosen = retry_after_ms
            .map(u64::from)
            .unwrap_or(base)
            .min(self.max_delay_ms);
        Duration::from_millis(chosen)
    }

    /// Decide what to do next after an attempt failed.
    pub fn decide(&self, err: &Error, attempt: u32) -> Decision {
        if err.is_retryable() && attempt < self.max_retries {
            return Decision::Retry {
                delay: self.backoff_delay(attempt, err.retry_after_ms()),
            };
        }
        Decision::Fail
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TimeoutPhase;

    fn policy() -> RetryPolicy {
        RetryPolicy::from_config(&RetryConfig {
            max_retries: 2,
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1_000),
        })
    }

    fn remote(status: u16, retryable: bool, retry_after_ms: Option<u32>) -> Error {
        Error::Remote {
            status,
            message: String::new(),
            retryable,
            retry_after_ms,
        }
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let p = policy();
        assert_eq!(p.backoff_delay(0, None), Duration::from_millis(100));
        assert_eq!(p.backoff_delay(1, None), Duration::from_millis(200));
        assert_eq!(p.backoff_delay(2, None), Duration::from_millis(400));
        assert_eq!(p.backoff_delay(5, None), Duration::from_millis(1_000));
        assert_eq!(p.backoff_delay(70, None), Duration::from_millis(1_000));
    }

    #[test]
    fn retry_after_hint_wins_but_stays_capped() {
        let p = policy();
        assert_eq!(p.backoff_delay(0, Some(750)), Duration::from_millis(750));
        assert_eq!(p.backoff_delay(0, Some(60_000)), Duration::from_millis(1_000));
    }

    #[test]
    fn transient_failures_retry_until_bound() {
        let p = policy();
        let err = remote(503, true, None);
        assert_eq!(
            p.decide(&err, 0),
            Decision::Retry {
                delay: Duration::from_millis(100)
            }
        );
        assert!(matches!(p.decide(&err, 1), Decision::Retry { .. }));
        assert_eq!(p.decide(&err, 2), Decision::Fail);

        let timeout = Error::Timeout {
            phase: TimeoutPhase::Request,
        };
        assert!(matches!(p.decide(&timeout, 0), Decision::Retry { .. }));
    }

    #[test]
    fn permanent_failures_never_retry() {
        let p = policy();
        assert_eq!(p.decide(&remote(401, false, None), 0), Decision::Fail);
        assert_eq!(
            p.decide(&Error::runtime("No choices returned from the model"), 0),
            Decision::Fail
        );
    }
}
