//! Circuit breaker and request accounting for upstream calls.
//!
//! Both live on the client instance, which is built once per sync cycle, so
//! their state never outlives the cycle.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Default number of consecutive transient failures that opens the circuit.
pub const DEFAULT_BREAKER_THRESHOLD: u32 = 10;

/// Consecutive-failure breaker. Once open it stays open for the lifetime of
/// the instance; any success before that resets the count.
pub struct CircuitBreaker {
    consecutive_failures: AtomicU32,
    threshold: u32,
}

impl CircuitBreaker {
    pub fn new(threshold: u32) -> Self {
        Self {
            consecutive_failures: AtomicU32::new(0),
            threshold: threshold.max(1),
        }
    }

    pub fn is_open(&self) -> bool {
        self.failures() >= self.threshold
    }

    pub fn failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }

    /// Counts one transient failure and returns the new consecutive total.
    pub fn record_failure(&self) -> u32 {
        self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_BREAKER_THRESHOLD)
    }
}

/// Atomic counters tracking upstream request outcomes.
#[derive(Default)]
pub struct RequestTracker {
    requests_made: AtomicU64,
    requests_succeeded: AtomicU64,
    requests_transient: AtomicU64,
    requests_fatal: AtomicU64,
    short_circuited: AtomicU64,
    /// Cumulative backoff time in milliseconds.
    total_backoff_ms: AtomicU64,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self) {
        self.requests_made.fetch_add(1, Ordering::Relaxed);
        self.requests_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transient(&self) {
        self.requests_made.fetch_add(1, Ordering::Relaxed);
        self.requests_transient.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fatal(&self) {
        self.requests_made.fetch_add(1, Ordering::Relaxed);
        self.requests_fatal.fetch_add(1, Ordering::Relaxed);
    }

    /// A call refused by the open breaker. No request was made.
    pub fn record_short_circuit(&self) {
        self.short_circuited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_backoff(&self, duration: Duration) {
        self.total_backoff_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Snapshot the current counters.
    pub fn summary(&self) -> TrackerSummary {
        TrackerSummary {
            requests_made: self.requests_made.load(Ordering::Relaxed),
            requests_succeeded: self.requests_succeeded.load(Ordering::Relaxed),
            requests_transient: self.requests_transient.load(Ordering::Relaxed),
            requests_fatal: self.requests_fatal.load(Ordering::Relaxed),
            short_circuited: self.short_circuited.load(Ordering::Relaxed),
            total_backoff_secs: self.total_backoff_ms.load(Ordering::Relaxed) as f64 / 1000.0,
        }
    }
}

/// Immutable snapshot of tracker counters for display.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackerSummary {
    pub requests_made: u64,
    pub requests_succeeded: u64,
    pub requests_transient: u64,
    pub requests_fatal: u64,
    pub short_circuited: u64,
    pub total_backoff_secs: f64,
}
