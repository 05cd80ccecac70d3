//! The `trending` subcommand: read a leaderboard from SQLite.

use std::path::Path;

use addonpulse_lib::{validation, Db};
use anyhow::Result;
use chrono::Utc;
use clap::Args;

use crate::output::{
    print_json, print_leaderboard_csv, print_leaderboard_markdown, print_leaderboard_table,
    OutputFormat,
};

/// Arguments for the `trending` subcommand.
#[derive(Args)]
pub struct TrendingArgs {
    /// Leaderboard: hot or rising
    #[arg(long, default_value = "hot")]
    pub board: String,

    /// Number of rows to show (1-100)
    #[arg(long, default_value = "20")]
    pub limit: usize,
}

pub fn run(args: &TrendingArgs, db_path: &Path, format: &OutputFormat) -> Result<()> {
    let board = validation::validate_board(&args.board)?;
    let limit = validation::validate_limit(args.limit)?;

    let db = Db::open(db_path)?;
    db.init()?;
    let rows = db.leaderboard(board, limit, Utc::now())?;

    eprintln!("{} leaderboard: {} entries", board, rows.len());
    match format {
        OutputFormat::Table => print_leaderboard_table(&rows),
        OutputFormat::Markdown => print_leaderboard_markdown(&rows),
        OutputFormat::Csv => print_leaderboard_csv(&rows)?,
        OutputFormat::Json => print_json(&rows),
    }
    Ok(())
}
