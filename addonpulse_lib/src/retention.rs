//! Batched deletion of expired history.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::db::{Db, DbError};

#[derive(Debug, Clone, PartialEq)]
pub struct RetentionPolicy {
    pub snapshot_days: i64,
    pub rank_history_days: i64,
    pub batch_size: usize,
    /// Upper bound on batches per table in one sweep.
    pub max_batches: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            snapshot_days: 95,
            rank_history_days: 7,
            batch_size: 5_000,
            max_batches: 20,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableSweep {
    pub deleted: usize,
    /// Batches that removed at least one row.
    pub batches: usize,
    /// Stopped on the batch cap with expired rows still left.
    pub capped: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepSummary {
    pub snapshots: TableSweep,
    pub rank_history: TableSweep,
}

fn sweep_table<F, R>(
    policy: &RetentionPolicy,
    mut delete_batch: F,
    remaining: R,
) -> Result<TableSweep, DbError>
where
    F: FnMut(usize) -> Result<usize, DbError>,
    R: FnOnce() -> Result<i64, DbError>,
{
    let batch_size = policy.batch_size.max(1);
    let mut out = TableSweep::default();
    for _ in 0..policy.max_batches {
        let deleted = delete_batch(batch_size)?;
        if deleted > 0 {
            out.batches += 1;
            out.deleted += deleted;
        }
        if deleted < batch_size {
            return Ok(out);
        }
    }
    out.capped = remaining()? > 0;
    Ok(out)
}

/// Removes snapshots and rank history older than the policy windows.
pub fn sweep(
    db: &Db,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> Result<SweepSummary, DbError> {
    let snapshot_cutoff = now - Duration::days(policy.snapshot_days);
    let rank_cutoff = now - Duration::days(policy.rank_history_days);

    let snapshots = sweep_table(
        policy,
        |n| db.delete_snapshots_before(snapshot_cutoff, n),
        || db.count_snapshots_before(snapshot_cutoff),
    )?;
    let rank_history = sweep_table(
        policy,
        |n| db.delete_rank_history_before(rank_cutoff, n),
        || db.count_rank_history_before(rank_cutoff),
    )?;

    if snapshots.capped || rank_history.capped {
        tracing::warn!(
            "Retention sweep hit the {}-batch cap; remaining rows wait for the next cycle",
            policy.max_batches
        );
    }
    tracing::info!(
        "Retention sweep removed {} snapshots and {} rank history rows",
        snapshots.deleted,
        rank_history.deleted
    );
    Ok(SweepSummary {
        snapshots,
        rank_history,
    })
}
