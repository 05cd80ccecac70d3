//! Retrying, circuit-breaking wrapper around the API client.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use curseforge_api::types::{Mod, PaginatedResponse};
use curseforge_api::{Client, ModSearchQuery};
use rand::Rng;

use crate::breaker::{CircuitBreaker, RequestTracker, DEFAULT_BREAKER_THRESHOLD};
use crate::error::UpstreamError;

/// Backoff schedule for transient failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts per request, including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryConfig {
    /// Delay after the `attempt`-th failure (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(30);
        let exp = 1u64 << shift;
        let base = self
            .base_delay_ms
            .saturating_mul(exp)
            .min(self.max_delay_ms);
        let jitter = rand::thread_rng().gen_range(0.8..1.2);
        Duration::from_millis((base as f64 * jitter) as u64)
    }
}

/// Per-cycle upstream behaviour.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamConfig {
    pub retry: RetryConfig,
    pub breaker_threshold: u32,
    /// Minimum gap between consecutive requests.
    pub request_delay: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            breaker_threshold: DEFAULT_BREAKER_THRESHOLD,
            request_delay: Duration::from_millis(250),
        }
    }
}

/// API client wrapper that adds retry, backoff and a circuit breaker.
///
/// Build one per sync cycle: the breaker and the request counters belong to
/// the instance and are not shared between cycles.
pub struct ResilientClient {
    inner: Client,
    retry: RetryConfig,
    breaker: CircuitBreaker,
    tracker: RequestTracker,
    request_delay: Duration,
    /// Tracks when the last HTTP request was sent, for pacing.
    last_request: Mutex<Option<Instant>>,
}

impl ResilientClient {
    pub fn new(inner: Client, config: UpstreamConfig) -> Self {
        Self {
            inner,
            retry: config.retry,
            breaker: CircuitBreaker::new(config.breaker_threshold),
            tracker: RequestTracker::new(),
            request_delay: config.request_delay,
            last_request: Mutex::new(None),
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn tracker(&self) -> &RequestTracker {
        &self.tracker
    }

    async fn pace(&self) {
        let sleep_dur = {
            let last = self.last_request.lock().unwrap_or_else(|e| e.into_inner());
            match *last {
                Some(last_time) if last_time.elapsed() < self.request_delay => {
                    Some(self.request_delay - last_time.elapsed().min(self.request_delay))
                }
                _ => None,
            }
        };
        if let Some(dur) = sleep_dur {
            tokio::time::sleep(dur).await;
        }
        *self.last_request.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
    }

    /// Fetches one page, retrying transient failures until the attempt
    /// budget runs out or the breaker opens.
    pub async fn fetch_page(
        &self,
        query: &ModSearchQuery,
    ) -> Result<PaginatedResponse<Mod>, UpstreamError> {
        let mut attempt = 0u32;
        loop {
            if self.breaker.is_open() {
                self.tracker.record_short_circuit();
                return Err(UpstreamError::CircuitOpen {
                    failures: self.breaker.failures(),
                });
            }

            attempt += 1;
            self.pace().await;

            match self.inner.search_mods(query).await {
                Ok(page) => {
                    self.breaker.record_success();
                    self.tracker.record_success();
                    return Ok(page);
                }
                Err(err) if err.is_transient() => {
                    self.tracker.record_transient();
                    let failures = self.breaker.record_failure();

                    if attempt >= self.retry.max_attempts {
                        tracing::error!(
                            "{} page at index {} failed after {} attempt(s): {}",
                            query.sort_field,
                            query.common.index,
                            attempt,
                            err
                        );
                        return Err(UpstreamError::Transient {
                            attempts: attempt,
                            source: err,
                        });
                    }
                    if self.breaker.is_open() {
                        tracing::error!(
                            "Circuit opened after {} consecutive transient failures",
                            failures
                        );
                        continue;
                    }

                    let delay = err
                        .retry_after()
                        .unwrap_or_else(|| self.retry.delay_for_attempt(attempt));
                    tracing::warn!(
                        "{} page request failed (attempt {}/{}), retrying in {:.1}s: {}",
                        query.sort_field,
                        attempt,
                        self.retry.max_attempts,
                        delay.as_secs_f64(),
                        err
                    );
                    self.tracker.record_backoff(delay);
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    self.tracker.record_fatal();
                    tracing::error!(
                        "{} page at index {} rejected: {}",
                        query.sort_field,
                        query.common.index,
                        err
                    );
                    return Err(UpstreamError::Fatal(err));
                }
            }
        }
    }
}
