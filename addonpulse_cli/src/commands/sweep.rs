//! The `sweep` subcommand: run only the retention sweeper.

use std::path::Path;

use addonpulse_lib::retention;
use addonpulse_lib::{Db, RetentionPolicy};
use anyhow::{bail, Result};
use chrono::Utc;
use clap::Args;

use crate::output::{print_json, print_sweep_summary, OutputFormat};

/// Arguments for the `sweep` subcommand.
#[derive(Args)]
pub struct SweepArgs {
    /// Keep snapshots for this many days
    #[arg(long, default_value = "95")]
    pub snapshot_days: i64,

    /// Keep rank history for this many days
    #[arg(long, default_value = "7")]
    pub rank_history_days: i64,

    /// Rows deleted per batch
    #[arg(long, default_value = "5000")]
    pub batch_size: usize,

    /// Maximum batches per table
    #[arg(long, default_value = "20")]
    pub max_batches: usize,
}

pub fn run(args: &SweepArgs, db_path: &Path, format: &OutputFormat) -> Result<()> {
    if args.snapshot_days < 1 || args.rank_history_days < 1 {
        bail!("retention windows must be at least one day");
    }
    if args.batch_size == 0 || args.max_batches == 0 {
        bail!("batch size and batch cap must be positive");
    }
    let policy = RetentionPolicy {
        snapshot_days: args.snapshot_days,
        rank_history_days: args.rank_history_days,
        batch_size: args.batch_size,
        max_batches: args.max_batches,
    };

    let db = Db::open(db_path)?;
    db.init()?;
    let summary = retention::sweep(&db, &policy, Utc::now())?;

    match format {
        OutputFormat::Json => print_json(&summary),
        _ => print_sweep_summary(&summary),
    }
    Ok(())
}
