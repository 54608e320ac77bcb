//! Upstream call timing counters shared by every in-flight completion.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PerformanceStats {
    pub requests: u64,
    pub slow_requests: u64,
    pub failures: u64,
    pub total_response_time: Duration,
}

impl PerformanceStats {
    pub fn average_response_time(&self) -> Duration {
        if self.requests == 0 {
            return Duration::ZERO;
        }
        let micros = self.total_response_time.as_micros() / u128::from(self.requests);
        Duration::from_micros(u64::try_from(micros).unwrap_or(u64::MAX))
    }

    pub fn slow_request_percentage(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.slow_requests as f64 / self.requests as f64 * 100.0
        }
    }
}

/// Counts completions when enabled; a disabled monitor records nothing.
#[derive(Debug)]
pub(crate) struct PerformanceMonitor {
    enabled: bool,
    requests: AtomicU64,
    slow_requests: AtomicU64,
    failures: AtomicU64,
    total_micros: AtomicU64,
}

impl PerformanceMonitor {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            requests: AtomicU64::new(0),
            slow_requests: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            total_micros: AtomicU64::new(0),
        }
    }

    /// Record one finished call and return the updated counters, or `None` when disabled.
    pub(crate) fn record(
        &self,
        elapsed: Duration,
        slow: bool,
        failed: bool,
    ) -> Option<PerformanceStats> {
        if !self.enabled {
            return None;
        }
        self.requests.fetch_add(1, Ordering::Relaxed);
        if slow {
            self.slow_requests.fetch_add(1, Ordering::Relaxed);
        }
        if failed {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.total_micros.fetch_add(micros, Ordering::Relaxed);
        Some(self.snapshot())
    }

    pub(crate) fn snapshot(&self) -> PerformanceStats {
        PerformanceStats {
            requests: self.requests.load(Ordering::Relaxed),
            slow_requests: self.slow_requests.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            total_response_time: Duration::from_micros(self.total_micros.load(Ordering::Relaxed)),
        }
    }
}
