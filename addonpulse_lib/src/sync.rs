//! One ingestion cycle: fetch, write, deactivate, score, sweep.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use curseforge_api::{ModSearchQuery, ModSortField, Query, MAX_RESULT_WINDOW};
use serde::Serialize;

use crate::breaker::TrackerSummary;
use crate::client::ResilientClient;
use crate::db::{Db, DbError, ItemRecord};
use crate::error::UpstreamError;
use crate::retention::{self, RetentionPolicy, SweepSummary};
use crate::trending::{self, TrendingSummary};
use crate::validation::SYNC_STRATEGIES;

/// A cycle whose write error rate exceeds this is reported failed.
pub const MAX_ERROR_RATE: f64 = 0.01;

/// Cycles slower than this log a warning.
pub const SLOW_CYCLE: Duration = Duration::from_secs(55 * 60);

const WRITE_FAILURE_SAMPLE: usize = 25;

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub game_id: i64,
    /// Fetch order. Earlier strategies win when the same item shows up twice.
    pub strategies: Vec<ModSortField>,
    pub page_size: i64,
    /// Page cap per strategy; further limited by the upstream result window.
    pub max_pages: i64,
    pub game_version: Option<String>,
    pub retention: RetentionPolicy,
    /// Timestamp used for the writes, scoring and sweep of the cycle. When
    /// unset, the clock is read once after fetching finishes.
    pub cycle_time: Option<DateTime<Utc>>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            game_id: 1,
            strategies: SYNC_STRATEGIES.to_vec(),
            page_size: 50,
            max_pages: MAX_RESULT_WINDOW / 50,
            game_version: None,
            retention: RetentionPolicy::default(),
            cycle_time: None,
        }
    }
}

impl SyncOptions {
    pub fn page_cap(&self) -> i64 {
        let page_size = self.page_size.max(1);
        self.max_pages.min(MAX_RESULT_WINDOW / page_size).max(1)
    }
}

/// Why a cycle was reported failed.
#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    #[error("strategy {strategy} aborted: {source}")]
    Upstream {
        strategy: String,
        #[source]
        source: UpstreamError,
    },
    #[error("no items observed and every strategy failed")]
    NoData,
    #[error("write error rate {rate:.4} exceeds {max}")]
    ErrorRate { rate: f64, max: f64 },
    #[error("{stage} failed: {source}")]
    Store {
        stage: &'static str,
        #[source]
        source: DbError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyOutcome {
    /// Paged until a short page or the page cap.
    Complete,
    /// Stopped on exhausted transient retries.
    Incomplete,
    /// Stopped on a fatal response or an open circuit.
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct StrategyReport {
    pub strategy: String,
    pub pages: i64,
    pub records: usize,
    /// Records not already contributed by an earlier strategy.
    pub new_records: usize,
    pub outcome: StrategyOutcome,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub strategies: Vec<StrategyReport>,
    pub items_seen: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub error_rate: f64,
    /// First few item ids whose write rolled back.
    pub write_failures: Vec<i64>,
    /// `None` when deactivation was skipped.
    pub marked_inactive: Option<usize>,
    pub trending: Option<TrendingSummary>,
    pub sweep: Option<SweepSummary>,
    pub requests: TrackerSummary,
    pub failures: Vec<String>,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

pub fn error_rate(success_count: usize, error_count: usize) -> f64 {
    let total = success_count + error_count;
    if total == 0 {
        0.0
    } else {
        error_count as f64 / total as f64
    }
}

struct Harvest {
    records: Vec<ItemRecord>,
    seen: HashSet<i64>,
    strategies: Vec<StrategyReport>,
    failures: Vec<SyncError>,
}

async fn harvest(client: &ResilientClient, options: &SyncOptions) -> Harvest {
    let mut out = Harvest {
        records: Vec::new(),
        seen: HashSet::new(),
        strategies: Vec::new(),
        failures: Vec::new(),
    };
    let page_size = options.page_size.max(1);
    let page_cap = options.page_cap();

    for &strategy in &options.strategies {
        let mut report = StrategyReport {
            strategy: strategy.to_string(),
            pages: 0,
            records: 0,
            new_records: 0,
            outcome: StrategyOutcome::Complete,
            error: None,
        };

        for page in 0..page_cap {
            let mut query = ModSearchQuery::default()
                .with_game_id(options.game_id)
                .with_sort_field(strategy)
                .with_index(page * page_size)
                .with_page_size(page_size);
            if let Some(version) = &options.game_version {
                query = query.with_game_version(version);
            }

            match client.fetch_page(&query).await {
                Ok(resp) => {
                    report.pages += 1;
                    let count = resp.data.len();
                    report.records += count;
                    for item in &resp.data {
                        if out.seen.insert(item.id) {
                            out.records.push(ItemRecord::from(item));
                            report.new_records += 1;
                        }
                    }
                    tracing::debug!(
                        "{} page {}: {} records ({} total upstream)",
                        strategy,
                        page + 1,
                        count,
                        resp.pagination.total_count
                    );
                    if (count as i64) < page_size {
                        break;
                    }
                }
                Err(err) => {
                    report.error = Some(err.to_string());
                    if err.aborts_strategy() {
                        report.outcome = StrategyOutcome::Failed;
                        out.failures.push(SyncError::Upstream {
                            strategy: strategy.to_string(),
                            source: err,
                        });
                    } else {
                        report.outcome = StrategyOutcome::Incomplete;
                        tracing::warn!("{} stopped early: {}", strategy, err);
                    }
                    break;
                }
            }
        }

        tracing::info!(
            "{}: {} page(s), {} records, {} new ({:?})",
            report.strategy,
            report.pages,
            report.records,
            report.new_records,
            report.outcome
        );
        out.strategies.push(report);
    }
    out
}

/// Runs one full cycle. Never returns early: every step runs and its
/// outcome lands in the report.
pub async fn run_cycle(
    client: &ResilientClient,
    db: &mut Db,
    options: &SyncOptions,
) -> SyncReport {
    let started_at = Utc::now();
    let clock = Instant::now();
    tracing::info!(
        "Sync cycle started: {} strategies, page size {}, page cap {}",
        options.strategies.len(),
        options.page_size,
        options.page_cap()
    );

    let Harvest {
        records,
        seen,
        strategies,
        mut failures,
    } = harvest(client, options).await;

    // Writes
    let recorded_at = options.cycle_time.unwrap_or_else(Utc::now);
    let mut success_count = 0usize;
    let mut error_count = 0usize;
    let mut write_failures = Vec::new();
    for record in &records {
        match db.write_snapshot(record, recorded_at) {
            Ok(()) => success_count += 1,
            Err(err) => {
                error_count += 1;
                tracing::warn!("{}", err);
                if write_failures.len() < WRITE_FAILURE_SAMPLE {
                    write_failures.push(err.item_id);
                }
            }
        }
    }
    tracing::info!("Wrote {} items ({} failed)", success_count, error_count);

    // Deactivation
    let coverage_complete = strategies
        .iter()
        .all(|s| s.outcome == StrategyOutcome::Complete);
    let marked_inactive = if !coverage_complete {
        tracing::warn!("Skipping inactive marking: upstream coverage incomplete this cycle");
        None
    } else {
        match db.mark_inactive_except(&seen, recorded_at) {
            Ok(n) => {
                tracing::info!("Marked {} unseen items inactive", n);
                Some(n)
            }
            Err(source) => {
                failures.push(SyncError::Store {
                    stage: "inactive marking",
                    source,
                });
                None
            }
        }
    };

    let all_failed = !strategies.is_empty()
        && strategies
            .iter()
            .all(|s| s.outcome != StrategyOutcome::Complete);
    if seen.is_empty() && all_failed {
        failures.push(SyncError::NoData);
    }

    // Scoring
    let trending = match trending::run(db, recorded_at) {
        Ok(summary) => Some(summary),
        Err(source) => {
            failures.push(SyncError::Store {
                stage: "trending calculation",
                source,
            });
            None
        }
    };

    // Retention
    let sweep = match retention::sweep(db, &options.retention, recorded_at) {
        Ok(summary) => Some(summary),
        Err(source) => {
            failures.push(SyncError::Store {
                stage: "retention sweep",
                source,
            });
            None
        }
    };

    let rate = error_rate(success_count, error_count);
    if rate > MAX_ERROR_RATE {
        failures.push(SyncError::ErrorRate {
            rate,
            max: MAX_ERROR_RATE,
        });
    }

    let elapsed = clock.elapsed();
    if elapsed > SLOW_CYCLE {
        tracing::warn!(
            "Sync cycle took {:.1} minutes, close to the scheduling interval",
            elapsed.as_secs_f64() / 60.0
        );
    }

    for failure in &failures {
        tracing::error!("{}", failure);
    }
    let requests = client.tracker().summary();
    tracing::info!(
        "Sync cycle finished in {:.1}s: {} items, {} written, {} failed, {} requests",
        elapsed.as_secs_f64(),
        seen.len(),
        success_count,
        error_count,
        requests.requests_made
    );

    SyncReport {
        started_at,
        finished_at: Utc::now(),
        duration_secs: elapsed.as_secs_f64(),
        strategies,
        items_seen: seen.len(),
        success_count,
        error_count,
        error_rate: rate,
        write_failures,
        marked_inactive,
        trending,
        sweep,
        requests,
        failures: failures.iter().map(|f| f.to_string()).collect(),
    }
}
